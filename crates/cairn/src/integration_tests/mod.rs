mod harness;

mod publish;
mod queries;
mod sync;
