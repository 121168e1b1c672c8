//! Agent Runtime - conversational reservation handling for La Casona
//!
//! This crate is the conversational layer of the casona system:
//! - Routes inbound WhatsApp messages to a handler (`classifier`)
//! - Extracts reservation slots from Spanish text (`conversation`)
//! - Tracks at most one pending reservation action per customer (`runtime`)
//! - Executes confirmed actions against storage and the calendar (`executor`)
//!
//! # Architecture
//!
//! Every turn walks the same constrained loop:
//! 1. **Routing** (`classifier`) - Parse NL → a `Route` plus slot values
//! 2. **Guardrail Enforcement** (`guardrails`) - Gate mutations behind confirmation
//! 3. **Pending Tracking** (`runtime`) - Advance the per-customer tracker
//! 4. **Tool Execution** (`executor`) - Call reservation storage and the calendar
//!
//! # Key Types
//!
//! - `Orchestrator` - Main entry point (see `runtime` module)
//! - `Classifier` - Pluggable trait for rule-based or LLM-backed routing
//! - `GuardrailPolicy` - Confirmation and escalation constraints
//!
//! # Safety Principle
//!
//! The classifier is strictly a translator. It NEVER mutates a reservation.
//! Storage and calendar writes happen only after the customer affirms a
//! fully specified pending action, and only inside the executor.

pub mod classifier;
pub mod conversation;
pub mod executor;
pub mod guardrails;
pub mod runtime;
pub mod session;

pub use classifier::{Classifier, LlmClassifier, LlmClient, RouteDecision, RuleClassifier};
pub use executor::{ExecutionError, ExecutionOutcome, ToolExecutor};
pub use guardrails::{GuardrailDecision, GuardrailIntent, GuardrailPolicy};
pub use runtime::{Orchestrator, OrchestratorConfig};
