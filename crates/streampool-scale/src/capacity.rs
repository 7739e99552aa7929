//! Rendering capacity calculator.

use streampool_batch::{AllocationState, BatchProvider, PoolRole};

/// Total session capacity across live rendering pools.
///
/// Counts rendering-role pools that are not being deleted and have at
/// least one target dedicated node, multiplying node counts by the
/// per-node user capacity. Lists pools fresh on every call; capacity is
/// never cached across evaluations.
///
/// Returns 0 when no qualifying pool exists, which the decision engine
/// treats as the cold-start signal.
pub async fn max_rendering_capacity(
    provider: &dyn BatchProvider,
    max_users_per_node: u32,
) -> anyhow::Result<u32> {
    let pools = provider.list_pools().await?;
    let nodes: u32 = pools
        .iter()
        .filter(|p| {
            p.role == PoolRole::Rendering
                && p.allocation_state != AllocationState::Deleting
                && p.target_dedicated_nodes > 0
        })
        .map(|p| p.target_dedicated_nodes)
        .sum();
    Ok(nodes * max_users_per_node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use streampool_batch::{InMemoryBatch, Pool, PoolSpec, VmImage};

    #[tokio::test]
    async fn empty_inventory_has_zero_capacity() {
        let batch = InMemoryBatch::new();
        assert_eq!(max_rendering_capacity(&batch, 4).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sums_rendering_nodes_times_max_users() {
        let batch = InMemoryBatch::new();
        batch
            .create_pool(PoolSpec::rendering("render-1", 2, None))
            .await
            .unwrap();
        batch
            .create_pool(PoolSpec::rendering("render-2", 3, None))
            .await
            .unwrap();

        assert_eq!(max_rendering_capacity(&batch, 4).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn excludes_turn_deleting_and_empty_pools() {
        let batch = InMemoryBatch::new();
        batch
            .create_pool(PoolSpec::rendering("render-1", 2, None))
            .await
            .unwrap();
        batch
            .create_pool(PoolSpec::turn_relay("turn-1", 5, None))
            .await
            .unwrap();
        batch
            .create_pool(PoolSpec::rendering("render-gone", 5, None))
            .await
            .unwrap();
        batch.delete_pool("render-gone").await.unwrap();
        batch
            .seed_pool(
                Pool {
                    id: "render-empty".to_string(),
                    role: PoolRole::Rendering,
                    target_dedicated_nodes: 0,
                    allocation_state: AllocationState::Steady,
                    vm_image: VmImage::rendering_default(),
                    job_id: None,
                },
                vec![],
            )
            .await;

        assert_eq!(max_rendering_capacity(&batch, 4).await.unwrap(), 8);
    }
}
