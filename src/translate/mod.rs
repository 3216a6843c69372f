//! Per-aspect translators (§2). Each submodule owns one slice of the
//! `VEVENT` ↔ `JsEvent` mapping and is invoked from [`event`], the hub.

pub mod alerts;
pub mod event;
pub mod links;
pub mod locations;
pub mod overrides;
pub mod participants;
pub mod recurrence;
pub mod time;
