//! AOI benchmarks
//!
//! Neighborhood lookup, nearby-id collection and cross-cell moves at various
//! populations over the default demo region.
//!
//! Run with: cargo bench --bench aoi

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use aoi_world_server::config::WorldConfig;
use aoi_world_server::world::notify::SendError;
use aoi_world_server::world::registry::EntityRegistry;
use aoi_world_server::world::{visibility, AoiManager, Entity, Notification, Outbound, Position};

/// Outbound that accepts and discards everything
struct Discard;

impl Outbound for Discard {
    fn send(&self, _notification: Notification) -> Result<(), SendError> {
        Ok(())
    }
}

fn random_position(rng: &mut StdRng, config: &WorldConfig) -> Position {
    let r = config.region;
    Position::new(
        rng.gen_range(r.min_x as f32..r.max_x as f32),
        0.0,
        rng.gen_range(r.min_y as f32..r.max_y as f32),
        rng.gen_range(0.0..360.0),
    )
}

/// Registry populated with `count` entities scattered over the region
fn populated_registry(count: usize) -> (EntityRegistry, Vec<Arc<Entity>>) {
    let config = WorldConfig::default();
    let registry = EntityRegistry::new(AoiManager::new(config.region).unwrap());
    let mut rng = StdRng::seed_from_u64(7);
    let outbound: Arc<dyn Outbound> = Arc::new(Discard);

    let entities: Vec<Arc<Entity>> = (1..=count as u32)
        .map(|id| {
            let entity = Arc::new(Entity::new(id, random_position(&mut rng, &config), outbound.clone()));
            registry.register(entity.clone()).unwrap();
            entity
        })
        .collect();

    (registry, entities)
}

fn bench_neighborhood(c: &mut Criterion) {
    let aoi = AoiManager::new(WorldConfig::default().region).unwrap();
    let cells = aoi.grid_count();

    c.bench_function("neighborhood_of/all_cells", |b| {
        b.iter(|| {
            for gid in 0..cells {
                black_box(aoi.neighborhood_of(gid).unwrap());
            }
        })
    });
}

fn bench_entity_ids_near(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_ids_near");
    group.sample_size(50);

    for count in [100, 500, 1000, 2000] {
        let (registry, _entities) = populated_registry(count);
        let config = WorldConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let probes: Vec<Position> = (0..64).map(|_| random_position(&mut rng, &config)).collect();

        group.throughput(Throughput::Elements(probes.len() as u64));
        group.bench_with_input(BenchmarkId::new("3x3", count), &count, |b, _| {
            b.iter(|| {
                for p in &probes {
                    black_box(registry.aoi().entity_ids_near(p.x, p.z).unwrap());
                }
            })
        });
    }
    group.finish();
}

fn bench_cross_cell_move(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_move");
    group.sample_size(50);

    for count in [100, 500, 1000, 2000] {
        let (registry, entities) = populated_registry(count);
        let config = WorldConfig::default();
        let mut rng = StdRng::seed_from_u64(13);
        let targets: Vec<Position> = (0..256).map(|_| random_position(&mut rng, &config)).collect();
        let mover = entities[0].clone();
        let mut next = 0usize;

        group.bench_with_input(BenchmarkId::new("random_target", count), &count, |b, _| {
            b.iter(|| {
                let target = targets[next % targets.len()];
                next += 1;
                let outcome = visibility::apply_move(&registry, &mover, target).unwrap();
                black_box(outcome.fanout.dispatch())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_neighborhood, bench_entity_ids_near, bench_cross_cell_move);
criterion_main!(benches);
