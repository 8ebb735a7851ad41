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

use overturemaps::geo::BoundingBox;
use rand::Rng;
use rand::distr::{Alphanumeric, SampleString};
use serde_json::Value;

pub fn rand_dir_name() -> String {
    format!(
        "overturemaps-{}",
        Alphanumeric.sample_string(&mut rand::rng(), 8).to_lowercase()
    )
}

/// Random box inside `area`, never wrapping.
pub fn rand_bbox_within<R: Rng>(rng: &mut R, area: &BoundingBox) -> BoundingBox {
    let x0 = rng.random_range(area.west()..area.east());
    let x1 = rng.random_range(area.west()..area.east());
    let y0 = rng.random_range(area.south()..area.north());
    let y1 = rng.random_range(area.south()..area.north());
    BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)).unwrap()
}

/// Every line of a GeoJSONSeq document, parsed.
pub fn parse_lines(text: &str) -> Vec<Value> {
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

/// `properties.id` of each feature.
pub fn feature_ids(features: &[Value]) -> Vec<String> {
    features
        .iter()
        .map(|f| f["properties"]["id"].as_str().unwrap().to_string())
        .collect()
}
