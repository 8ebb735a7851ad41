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

use arrow::array::AsArray;
use bytes::Bytes;
use overturemaps::error::Error;
use overturemaps::extract::{ExtractSummary, Extractor, StreamingQuery, TypeSelection};
use overturemaps::geo::{BoundingBox, Geometry};
use overturemaps::pruning::PruningSource;
use overturemaps::sink::{FeatureSink, OutputFormat, OutputTarget, SharedBuffer};
use overturemaps_common::cleanup_guard::CleanupGuard;
use overturemaps_common::recording_store::{FailingCatalog, ReadFailingStore};
use overturemaps_common::test_context::{
    BOSTON, FIJI, LATEST_RELEASE, MID_OCEAN, PREVIOUS_RELEASE, TestContext, bbox,
};
use overturemaps_common::utils::{feature_ids, parse_lines, rand_bbox_within};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde_json::{Value, json};
use std::sync::Arc;

fn buildings_in(area: [f64; 4]) -> StreamingQuery {
    StreamingQuery::builder()
        .bbox(bbox(area))
        .types(TypeSelection::Named("building".into()))
        .build()
}

async fn run(extractor: &Extractor, query: &StreamingQuery) -> (ExtractSummary, String) {
    let buffer = SharedBuffer::new();
    let mut sink = FeatureSink::open(query.format, OutputTarget::from_writer(buffer.clone()));
    let summary = extractor.download(query, &mut sink).await.unwrap();
    (summary, buffer.to_string_lossy())
}

fn geometry_envelope(feature: &Value) -> BoundingBox {
    let coords = match feature["geometry"]["type"].as_str().unwrap() {
        "Point" => vec![feature["geometry"]["coordinates"].clone()],
        "Polygon" => feature["geometry"]["coordinates"][0]
            .as_array()
            .unwrap()
            .clone(),
        other => panic!("unexpected geometry {other}"),
    };
    let xs: Vec<f64> = coords.iter().map(|c| c[0].as_f64().unwrap()).collect();
    let ys: Vec<f64> = coords.iter().map(|c| c[1].as_f64().unwrap()).collect();
    BoundingBox::from_envelope(
        xs.iter().cloned().fold(f64::INFINITY, f64::min),
        ys.iter().cloned().fold(f64::INFINITY, f64::min),
        xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
    )
    .unwrap()
}

#[tokio::test]
async fn boston_bbox_returns_only_intersecting_buildings() {
    let ctx = TestContext::new().await;
    let query = buildings_in(BOSTON);
    let (summary, text) = run(&ctx.extractor(), &query).await;

    let features = parse_lines(&text);
    let expected = ctx.expected_ids("building", &bbox(BOSTON));
    assert!(!expected.is_empty());
    assert_eq!(feature_ids(&features), expected);
    for feature in &features {
        assert!(geometry_envelope(feature).intersects(&bbox(BOSTON)));
        assert!(feature["properties"].get("bbox").is_none());
    }

    assert_eq!(summary.release.version(), LATEST_RELEASE);
    assert_eq!(summary.rows_written, expected.len());
    assert_eq!(summary.partition_source, PruningSource::Listing);
    assert_eq!(summary.partitions.total, 4);
    assert!(summary.row_groups.eliminated > 0);
}

#[tokio::test]
async fn mid_ocean_bbox_yields_well_formed_empty_outputs() {
    let ctx = TestContext::new().await;

    let query = StreamingQuery {
        format: OutputFormat::GeoJson,
        ..buildings_in(MID_OCEAN)
    };
    let (summary, text) = run(&ctx.extractor(), &query).await;
    assert_eq!(summary.rows_written, 0);
    let doc: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(doc, json!({"type": "FeatureCollection", "features": []}));
    // statistics rule out every row group, so nothing beyond footers is fetched
    assert!(ctx.store.reads().is_empty());

    let query = StreamingQuery {
        format: OutputFormat::GeoJsonSeq,
        ..buildings_in(MID_OCEAN)
    };
    let (_, text) = run(&ctx.extractor(), &query).await;
    assert!(text.is_empty());

    let buffer = SharedBuffer::new();
    let query = StreamingQuery {
        format: OutputFormat::GeoParquet,
        ..buildings_in(MID_OCEAN)
    };
    let mut sink = FeatureSink::open(query.format, OutputTarget::from_writer(buffer.clone()));
    ctx.extractor().download(&query, &mut sink).await.unwrap();
    let reader =
        ParquetRecordBatchReaderBuilder::try_new(Bytes::from(buffer.contents())).unwrap();
    assert!(reader.schema().field_with_name("height").is_ok());
    assert_eq!(reader.metadata().file_metadata().num_rows(), 0);
}

#[tokio::test]
async fn antimeridian_bbox_matches_both_sides() {
    let ctx = TestContext::new().await;
    let (_, text) = run(&ctx.extractor(), &buildings_in(FIJI)).await;
    assert_eq!(
        feature_ids(&parse_lines(&text)),
        vec!["08b9b6000001", "08b9b6000002"]
    );
}

#[tokio::test]
async fn disabling_statistics_does_not_change_output() {
    let ctx = TestContext::new().await;
    let extractor = ctx.extractor();
    for area in [BOSTON, FIJI, MID_OCEAN, [-180.0, -90.0, 180.0, 90.0]] {
        ctx.store.clear();
        let (pruned, with_stats) = run(&extractor, &buildings_in(area)).await;
        let read_with_stats: usize = ctx.store.reads().iter().map(|r| r.1.len()).sum();

        ctx.store.clear();
        let query = StreamingQuery {
            use_statistics: false,
            ..buildings_in(area)
        };
        let (unpruned, without_stats) = run(&extractor, &query).await;
        let read_without_stats: usize = ctx.store.reads().iter().map(|r| r.1.len()).sum();

        assert_eq!(with_stats, without_stats, "output differs for {area:?}");
        assert!(read_with_stats <= read_without_stats);
        assert_eq!(unpruned.row_groups.eliminated, 0);
        assert_eq!(pruned.rows_written, unpruned.rows_written);
    }
}

#[tokio::test]
async fn catalog_failure_matches_catalog_output() {
    let ctx = TestContext::new().await;
    let with_catalog = ctx
        .extractor()
        .with_catalog(Arc::new(ctx.stac_catalog().await));
    let with_outage = ctx.extractor().with_catalog(Arc::new(FailingCatalog));

    for area in [BOSTON, FIJI, MID_OCEAN] {
        ctx.store.clear();
        let (catalog_summary, catalog_text) = run(&with_catalog, &buildings_in(area)).await;
        let catalog_footers = ctx.store.footers();

        let (fallback_summary, fallback_text) = run(&with_outage, &buildings_in(area)).await;

        assert_eq!(catalog_text, fallback_text, "output differs for {area:?}");
        assert_eq!(catalog_summary.partition_source, PruningSource::Catalog);
        assert_eq!(fallback_summary.partition_source, PruningSource::Listing);
        assert_eq!(fallback_summary.partitions.total, 4);
        assert!(catalog_footers.len() <= 4);
    }

    // Boston only touches the Boston and mixed partitions
    ctx.store.clear();
    run(&with_catalog, &buildings_in(BOSTON)).await;
    assert_eq!(
        ctx.store.footers(),
        vec![
            format!("release/{LATEST_RELEASE}/theme=buildings/type=building/part-00000.parquet"),
            format!("release/{LATEST_RELEASE}/theme=buildings/type=building/part-00003.parquet"),
        ]
    );
}

#[tokio::test]
async fn catalog_is_skipped_when_disabled_or_without_bbox() {
    let ctx = TestContext::new().await;
    let extractor = ctx
        .extractor()
        .with_catalog(Arc::new(ctx.stac_catalog().await));

    let query = StreamingQuery {
        use_catalog: false,
        ..buildings_in(BOSTON)
    };
    let (summary, _) = run(&extractor, &query).await;
    assert_eq!(summary.partition_source, PruningSource::Listing);

    let query = StreamingQuery::builder()
        .types(TypeSelection::Named("place".into()))
        .build();
    let (summary, text) = run(&extractor, &query).await;
    assert_eq!(summary.partition_source, PruningSource::Listing);
    assert_eq!(parse_lines(&text).len(), ctx.features_of("place").len());
}

#[tokio::test]
async fn random_boxes_never_leak_records() {
    let ctx = TestContext::new().await;
    let extractor = ctx
        .extractor()
        .with_catalog(Arc::new(ctx.stac_catalog().await));
    let area = bbox([-71.08, 42.34, -71.04, 42.37]);
    let mut rng = SmallRng::seed_from_u64(42);

    for _ in 0..20 {
        let query_box = rand_bbox_within(&mut rng, &area);
        let query = StreamingQuery::builder()
            .bbox(query_box)
            .types(TypeSelection::Named("building".into()))
            .build();
        let (_, text) = run(&extractor, &query).await;
        let features = parse_lines(&text);
        for feature in &features {
            assert!(geometry_envelope(feature).intersects(&query_box));
        }
        assert_eq!(
            feature_ids(&features),
            ctx.expected_ids("building", &query_box)
        );
    }
}

#[tokio::test]
async fn sequence_output_is_independent_of_batch_size() {
    let ctx = TestContext::new().await;
    let (_, whole) = run(&ctx.extractor(), &buildings_in(BOSTON)).await;
    let query = StreamingQuery {
        batch_size: 1,
        ..buildings_in(BOSTON)
    };
    let (_, split) = run(&ctx.extractor(), &query).await;
    assert_eq!(whole, split);
    assert_eq!(whole.lines().count(), ctx.expected_ids("building", &bbox(BOSTON)).len());
}

#[tokio::test]
async fn geoparquet_file_output() {
    let ctx = TestContext::new().await;
    let guard = CleanupGuard::new();
    let path = guard.join("boston.parquet");

    let query = StreamingQuery {
        format: OutputFormat::GeoParquet,
        ..buildings_in(BOSTON)
    };
    let mut sink = FeatureSink::open(query.format, OutputTarget::file(&path).unwrap());
    let summary = ctx.extractor().download(&query, &mut sink).await.unwrap();
    assert!(!guard.join("boston.parquet.partial").exists());

    let bytes = Bytes::from(std::fs::read(&path).unwrap());
    let reader = ParquetRecordBatchReaderBuilder::try_new(bytes).unwrap();
    let geo = reader
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kv| kv.iter().find(|kv| kv.key == "geo").cloned())
        .and_then(|kv| kv.value)
        .unwrap();
    let geo: Value = serde_json::from_str(&geo).unwrap();
    assert_eq!(geo["columns"]["geometry"]["encoding"], "WKB");

    let extent: Vec<f64> = geo["columns"]["geometry"]["bbox"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    assert_eq!(extent, summary.extent.unwrap().to_array().to_vec());

    let mut rows = 0;
    for batch in reader.build().unwrap() {
        let batch = batch.unwrap();
        let geometry = batch.column_by_name("geometry").unwrap();
        let geometry = geometry.as_binary::<i32>();
        for row in 0..batch.num_rows() {
            let envelope = Geometry::from_wkb(geometry.value(row))
                .unwrap()
                .envelope()
                .unwrap();
            assert!(envelope.intersects(&bbox(BOSTON)));
        }
        rows += batch.num_rows();
    }
    assert_eq!(rows, summary.rows_written);
}

#[tokio::test]
async fn pinned_release_reads_that_release() {
    let ctx = TestContext::new().await;
    let query = StreamingQuery {
        release: Some(PREVIOUS_RELEASE.to_string()),
        ..buildings_in(BOSTON)
    };
    let (summary, text) = run(&ctx.extractor(), &query).await;
    assert_eq!(summary.release.version(), PREVIOUS_RELEASE);
    let ids = feature_ids(&parse_lines(&text));
    assert!(!ids.is_empty());
    assert!(ids.iter().all(|id| id.starts_with("08b2a0")));
}

#[tokio::test]
async fn theme_override_reads_custom_root() {
    let ctx = TestContext::new().await;
    let query = StreamingQuery::builder()
        .bbox(bbox(BOSTON))
        .types(TypeSelection::Override {
            theme: "places".into(),
            type_name: "place".into(),
        })
        .build();
    let (_, text) = run(&ctx.extractor(), &query).await;
    assert_eq!(
        feature_ids(&parse_lines(&text)),
        ctx.expected_ids("place", &bbox(BOSTON))
    );
}

#[tokio::test]
async fn failed_download_removes_partial_file() {
    let ctx = TestContext::new().await;
    let guard = CleanupGuard::new();
    let path = guard.join("out.geojson");

    let query = StreamingQuery::builder()
        .types(TypeSelection::Named("spaceport".into()))
        .format(OutputFormat::GeoJson)
        .build();
    let mut sink = FeatureSink::open(query.format, OutputTarget::file(&path).unwrap());
    let err = ctx.extractor().download(&query, &mut sink).await.unwrap_err();
    assert!(matches!(err, Error::UnknownType { .. }));
    assert!(!path.exists());
    assert!(!guard.join("out.geojson.partial").exists());
}

#[tokio::test]
async fn storage_failure_mid_download_removes_partial_file() {
    let ctx = TestContext::new().await;
    let guard = CleanupGuard::new();
    let path = guard.join("boston.geojsonseq");

    let extractor = Extractor::new(Arc::new(ReadFailingStore::new(ctx.partition_store())));
    let query = buildings_in(BOSTON);
    let mut sink = FeatureSink::open(query.format, OutputTarget::file(&path).unwrap());
    let err = extractor.download(&query, &mut sink).await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert!(!path.exists());
    assert!(!guard.join("boston.geojsonseq.partial").exists());
}
