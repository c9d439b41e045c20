//! Chargeflow - payments back-office
//!
//! Receives payment-provider webhooks for orders and chargebacks, records
//! them in per-entity event logs with provider-event idempotency, and keeps
//! the Order and Dispute aggregates consistent with those logs.
//!
//! Webhooks are applied in-process, through a Kafka topic consumed by worker
//! pools, or forwarded from a separate ingest process over HTTP.

pub mod bus;
pub mod clients;
pub mod config;
pub mod context;
pub mod dlq;
pub mod domain;
pub mod handlers;
pub mod http;
pub mod interfaces;
pub mod services;
pub mod storage;
pub mod utils;
pub mod webhook;
