pub mod config_store;
pub mod cues;
pub mod files;
pub mod knowledge_store;
pub mod runtime_engine;
pub mod script_file;
