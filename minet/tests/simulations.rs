//! Runs each prebuilt simulation end to end under a hard timeout.
use minet::simulations;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(5000)]
async fn forwarding_chain() {
    simulations::forwarding(4, true, None).await;
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(5000)]
async fn round_robin_rotation() {
    simulations::round_robin().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(5000)]
async fn fragmentation_across_shrinking_links() {
    simulations::fragmentation().await;
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10000)]
async fn path_vector_line_converges() {
    simulations::path_vector_line(4, Duration::from_millis(300), None).await;
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10000)]
async fn path_vector_ring_converges() {
    simulations::path_vector_ring(5, Duration::from_millis(300)).await;
}

#[tokio::test(flavor = "multi_thread")]
#[ntest::timeout(10000)]
async fn path_vector_tables_reload() {
    let dir = std::env::temp_dir().join(format!("minet_it_reload_{}", std::process::id()));
    simulations::path_vector_reload(Duration::from_millis(300), &dir).await;
}
