//! 编排层：任务目录、单任务执行与周期调度

pub mod catalog;
pub mod cycle;
pub mod task;

pub use catalog::{Catalog, Tier, WorkItem};
pub use cycle::{active_tier, CycleReport, CycleState, Orchestrator};
pub use task::AgentTask;
