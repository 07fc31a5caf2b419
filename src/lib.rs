pub mod config;
pub mod constraints;
pub mod debug;
pub mod evaluation;
pub mod experiment;
pub mod generators;
pub mod interval;
pub mod occupation;
pub mod parser;
pub mod problem;
pub mod propagation;
pub mod solvers;
pub mod topology;
