pub mod cache;
pub mod cross_file;
pub mod data_flow;
pub mod extract_update;
pub mod flow_graph;
pub mod ir_generation;
pub mod parsing;
pub mod pdg;
pub mod query_engine;
pub mod slicing;
pub mod taint_analysis;
pub mod type_resolution;
