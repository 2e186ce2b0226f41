pub mod common;
pub mod broker_scenarios;
pub mod startup;
