//! These models represent the objects passed around by the agent
//!
//! There are several related formats in play:
//! - turn requests sent from the interface to the agent
//! - openai-style messages/tools, sent from the agent to the LLM
//! - tool descriptors and call results, exchanged with the tool server
//!
//! These overlap to varying degrees. Wire formats are converted into the
//! internal structs at the boundary with to/from helpers, so the internal
//! models are not an exact match to any one of them.
pub mod message;
pub mod role;
pub mod tool;
