use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Byte range falls outside the underlying allocation.
    #[snafu(display("invalid region: offset {offset} + size {size} exceeds allocation of {len} bytes"))]
    InvalidRegion { offset: usize, size: usize, len: usize },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Image access outside the image extent.
    #[snafu(display("invalid image region: origin {origin:?} + region {region:?} exceeds extent {extent:?}"))]
    InvalidImageRegion { origin: [usize; 3], region: [usize; 3], extent: [usize; 3] },

    /// Fill pattern must evenly tile the filled range.
    #[snafu(display("fill pattern of {pattern} bytes does not divide region of {size} bytes"))]
    InvalidPattern { pattern: usize, size: usize },

    /// Element sizes of the two images differ.
    #[snafu(display("incompatible images: element size {src} vs {dst}"))]
    IncompatibleImages { src: usize, dst: usize },

    #[snafu(display("query index {index} out of range for pool of {count} slots"))]
    QueryIndexOutOfRange { index: usize, count: usize },
}
