// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # Clustersnap - Cluster-State Snapshot Controller for Kubernetes
//!
//! Clustersnap is a Kubernetes controller written in Rust that captures
//! point-in-time snapshots of every listable API object in a target cluster,
//! stores them as compressed archives in an S3-compatible object store, and
//! restores them onto a (possibly different) target cluster.
//!
//! ## Overview
//!
//! The controller is driven by four Custom Resource Definitions:
//!
//! - [`crd::Snapshot`] - requests a snapshot of a target cluster
//! - [`crd::Restore`] - requests a restore of a stored snapshot
//! - [`crd::RestorePreference`] - per-restore inclusion/exclusion policy
//! - [`crd::ObjectstoreConfig`] - bucket endpoint and credential reference
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - Phase machine and retry policy for Snapshot/Restore
//! - [`cluster`] - Snapshot and restore engines against the target cluster
//! - [`objectstore`] - Bucket abstraction and the S3 implementation
//! - [`syncer`] - Periodic reconciliation of stored archives vs. resources
//!
//! ## How a snapshot is taken
//!
//! Listing many resource kinds cannot be atomic. The snapshot engine brackets
//! the listing phase with two resource-version markers (create-then-delete
//! ConfigMaps), watches every resource kind concurrently while listing, and
//! replays the watch events up to the end marker into the listed set. The
//! result is equivalent to one atomic snapshot at the end marker for every
//! resource whose individual list-then-watch is linearizable.

pub mod cluster;
pub mod constants;
pub mod context;
pub mod crd;
pub mod duration;
pub mod errors;
pub mod metrics;
pub mod objectstore;
pub mod reconcilers;
pub mod syncer;

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
