//! Session orchestration for the voiceloop conversation server
//!
//! One `Session` per connection owns the conversation state machine; the
//! `ResponsePipeline` turns a finalized utterance into streamed tokens and
//! synthesized audio, with cooperative cancellation on barge-in.

pub mod prompt;
pub mod respond;
pub mod session;

pub use prompt::{build_user_content, fold_results, needs_search};
pub use respond::ResponsePipeline;
pub use session::{Session, TurnHandoff};
