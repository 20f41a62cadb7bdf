pub mod command;
pub mod cooldown;
pub mod permissions;
pub mod schedule;
pub mod trigger;

pub use command::{AdminCommand, Privilege};
pub use cooldown::CooldownLedger;
pub use permissions::{PermissionRegistry, PermissionState};
pub use schedule::Schedule;
pub use trigger::{
    ChannelSnapshot, Decision, EvalContext, IgnoreReason, TriggerEvaluator, TriggerReason,
    TriggerRule,
};
