//! App Custom Resource Definition.
//!
//! An App groups MicroServices. The operator creates one MicroService per
//! template, named `<app>-<template>`.

use super::condition::Condition;
use super::microservice::MicroServiceSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// App is the Schema for the apps API.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "app.o0w0o.cn",
    version = "v1",
    kind = "App",
    plural = "apps",
    namespaced,
    status = "AppStatus",
    printcolumn = r#"{"name":"Available", "type":"integer", "jsonPath":".status.availableVersions"}"#,
    printcolumn = r#"{"name":"Total", "type":"integer", "jsonPath":".status.totalVersions"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// MicroServices making up the App.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub micro_services: Vec<MicroServiceTemplate>,
}

/// Declaration of one MicroService inside an App.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MicroServiceTemplate {
    /// Short name; the MicroService is named `<app>-<name>`.
    pub name: String,

    /// MicroService spec copied verbatim.
    #[serde(default)]
    pub spec: MicroServiceSpec,
}

/// Who last handed this App to the cluster.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum FromManager {
    /// Authored locally, or handoff from the manager has completed.
    #[default]
    #[serde(rename = "Nil", alias = "None")]
    None,
    /// Created by the central manager.
    Created,
    /// Updated by the central manager.
    Updated,
}

/// App status.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppStatus {
    /// Condition history, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Number of MicroServices found for this App.
    #[serde(
        default,
        rename = "availableVersions",
        alias = "availableMicroServices"
    )]
    pub available_micro_services: i32,

    /// Number of declared MicroServices.
    #[serde(default, rename = "totalVersions", alias = "totalMicroServices")]
    pub total_micro_services: i32,

    /// Handoff flag set by the central manager.
    #[serde(default)]
    pub from_manager: FromManager,
}
