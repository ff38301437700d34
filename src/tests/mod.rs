// Test modules for insight-service
//
// Each source module has a corresponding test module that focuses on
// business logic verification; api.rs drives the full router in-process
// against a scripted LLM client.

// Test helper utilities (scripted LLM stub, state builders)
pub mod helpers;

pub mod config;

pub mod store;
