// MinIO Rust Library for Overture Maps GeoParquet Extraction
// Copyright 2025 MinIO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use criterion::{Criterion, criterion_group, criterion_main};
use overturemaps::geo::BoundingBox;
use overturemaps::pruning::RowFilter;
use overturemaps::pruning::row_filter::record_envelopes;
use overturemaps::sink::batch_to_features;
use overturemaps_common::fixtures::{FixtureFeature, feature_batch};
use std::hint::black_box;

fn grid(n: usize) -> Vec<FixtureFeature> {
    (0..n * n)
        .map(|i| {
            let (col, row) = ((i % n) as f64, (i / n) as f64);
            FixtureFeature::square(
                &format!("08b2a1{i:06}"),
                -72.0 + col * 0.001,
                42.0 + row * 0.001,
                0.0002,
                Some(i as f64),
            )
        })
        .collect()
}

fn bench_row_filter(c: &mut Criterion) {
    let batch = feature_batch(&grid(100));
    let bbox = BoundingBox::new(-71.97, 42.03, -71.93, 42.07).unwrap();
    let wrapping = BoundingBox::new(179.0, -18.0, -179.0, -16.0).unwrap();

    let by_bbox = RowFilter::for_query(Some(bbox), None);
    c.bench_function("row_filter bbox 10k", |b| {
        b.iter(|| by_bbox.apply(black_box(&batch)).unwrap())
    });

    let by_wrapping = RowFilter::for_query(Some(wrapping), None);
    c.bench_function("row_filter antimeridian 10k", |b| {
        b.iter(|| by_wrapping.apply(black_box(&batch)).unwrap())
    });

    let by_id = RowFilter::for_query(None, Some("08b2a1004321"));
    c.bench_function("row_filter id 10k", |b| {
        b.iter(|| by_id.apply(black_box(&batch)).unwrap())
    });

    c.bench_function("record_envelopes 10k", |b| {
        b.iter(|| record_envelopes(black_box(&batch)).unwrap())
    });

    let selected = by_bbox.apply(&batch).unwrap().unwrap();
    c.bench_function("batch_to_features", |b| {
        b.iter(|| batch_to_features(black_box(&selected)).unwrap())
    });
}

criterion_group!(benches, bench_row_filter);
criterion_main!(benches);
