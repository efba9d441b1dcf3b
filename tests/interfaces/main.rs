//! Interface tests for the deploy lifecycle using Cucumber.
//!
//! These scenarios verify the reconciliation contract (idempotent deploy,
//! deploy-while-deleting guard, tenant isolation, application store) on the
//! in-memory broker and control plane. Select the streaming runtime via
//! environment variable:
//!
//! ```bash
//! # Pulsar (default)
//! cargo test --test interfaces
//!
//! # Kafka
//! STREAMING_BACKEND=kafka cargo test --test interfaces
//! ```

mod backend;
mod steps;

use cucumber::World;
use steps::DeployWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running Deploy Lifecycle Interface Tests ===\n");
    DeployWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/deploy_lifecycle.feature")
        .await;

    println!("\n=== Running Application Store Interface Tests ===\n");
    DeployWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/application_store.feature")
        .await;
}
