//! KubeService Kubernetes Operator
//!
//! This crate provides a Kubernetes operator that expands application
//! declarations into Deployments, Services and Ingresses, including
//! NGINX canary Ingresses for weighted, header and cookie based traffic
//! splitting between versions.
//!
//! # Custom Resource Definitions
//!
//! - **App**: a set of MicroService templates; each becomes a MicroService
//! - **MicroService**: versions of one service (one Deployment each) and an
//!   optional LoadBalance (Services, Ingress, canary Ingresses)
//!
//! # Example
//!
//! ```yaml
//! apiVersion: app.o0w0o.cn/v1
//! kind: MicroService
//! metadata:
//!   name: shop-web
//! spec:
//!   currentVersionName: v1
//!   versions:
//!     - name: v1
//!       template: { ... }
//!     - name: v2
//!       template: { ... }
//!       canary:
//!         weight: 20
//!         header: X-Canary
//!   loadBalance:
//!     service:
//!       name: shop-web
//!       spec:
//!         ports: [{ port: 80 }]
//!     ingress:
//!       name: shop-web
//!       spec: { ... }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod labels;
pub mod notifier;
pub mod resources;
pub mod store;

pub use config::OperatorConfig;
pub use crd::{App, AppSpec, MicroService, MicroServiceSpec};
pub use error::{OperatorError, OperatorResult};
