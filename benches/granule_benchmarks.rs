use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use geo::Rect;
use granule_index::catalog::MEMORY_LOCATION;
use granule_index::{
    Envelope, GranuleIndex, GranuleRecord, Predicate, SpatialTreeCache, StoreBackedIndex,
};

fn grid(side: usize) -> Vec<GranuleRecord> {
    let mut granules = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            let (x, y) = (col as f64, row as f64);
            let footprint = Rect::new((x, y), (x + 1.2, y + 1.2)).to_polygon();
            granules.push(
                GranuleRecord::new(format!("g{}_{}", row, col), footprint)
                    .with_attribute("ingestion", (row * side + col) as i64),
            );
        }
    }
    granules
}

fn store_with(side: usize) -> StoreBackedIndex {
    let store = StoreBackedIndex::open(MEMORY_LOCATION).unwrap();
    store.add_granules(grid(side)).unwrap();
    store
}

fn benchmark_envelope_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_queries");
    let window = Envelope::new(20.0, 20.0, 25.0, 25.0);

    for side in [50, 100, 200] {
        let store = store_with(side);
        group.bench_with_input(BenchmarkId::new("store", side * side), &window, |b, window| {
            b.iter(|| store.find_in_envelope(black_box(window)).unwrap())
        });

        let cache = SpatialTreeCache::new(store_with(side));
        cache.rebuild().unwrap();
        group.bench_with_input(BenchmarkId::new("cached", side * side), &window, |b, window| {
            b.iter(|| cache.find_in_envelope(black_box(window)).unwrap())
        });
    }

    group.finish();
}

fn benchmark_filtered_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_queries");
    let predicate = Predicate::bbox("the_geom", Envelope::new(10.0, 10.0, 60.0, 60.0)).and(
        Predicate::compare("ingestion", granule_index::CompareOp::Lt, 2_500i64),
    );

    let store = store_with(100);
    group.bench_function("store", |b| {
        b.iter(|| store.find(black_box(&predicate)).unwrap())
    });

    let cache = SpatialTreeCache::new(store_with(100));
    cache.rebuild().unwrap();
    group.bench_function("cached", |b| {
        b.iter(|| cache.find(black_box(&predicate)).unwrap())
    });

    group.finish();
}

fn benchmark_tree_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_rebuild");

    for side in [50, 100] {
        let cache = SpatialTreeCache::new(store_with(side));
        group.bench_function(BenchmarkId::new("bulk_load", side * side), |b| {
            b.iter(|| {
                cache.evict();
                cache.rebuild().unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_envelope_queries,
    benchmark_filtered_queries,
    benchmark_tree_rebuild
);
criterion_main!(benches);
