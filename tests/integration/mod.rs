mod idempotence;
mod lifecycle;
mod retraction;
