//! External static-analysis adapters.

pub mod python_runner;

pub use python_runner::PythonRunner;
