//! Custom Resource Definitions for the KubeService operator.
//!
//! - [`App`]: a group of MicroServices
//! - [`MicroService`]: the versions and routing of one service

mod app;
mod condition;
mod microservice;

pub use app::{App, AppSpec, AppStatus, FromManager, MicroServiceTemplate};
pub use condition::{Condition, ConditionStatus, ConditionType};
pub use microservice::{
    Canary, DeployVersion, IngressLoadBalance, LoadBalance, MicroService, MicroServiceSpec,
    MicroServiceStatus, ServiceLoadBalance,
};
