//! MCP (Model Context Protocol) Server Implementation
//!
//! JSON-RPC 2.0 over stdio exposing the chat engine as MCP tools.

#[cfg(test)]
mod tests;

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::{ConnectionState, McpServer, ToolHandler};
