mod ndrange;
mod queue;
