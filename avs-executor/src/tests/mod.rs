pub mod common;

mod functions;
