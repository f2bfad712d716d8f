// Copyright (c) 2026 Tollgate Systems
// SPDX-License-Identifier: AGPL-3.0
//! Prometheus exporter wiring. Mounted at `GET /metrics` on the gateway's
//! own router, co-located with the rest of the HTTP surface rather than
//! exposed from a separate process.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the global recorder and returns a handle whose `render()`
/// produces the exposition-format body for the `/metrics` route.
pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}
