use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{
    compute_phash, hamming_distance, hash_from_hex, PhashBatch, PhashDbMatch, PhashDbRecord,
    PhashError, PhashFailure, PhashIndexSpec, PhashInput, PhashInputHash, PhashRecordSource,
};
use crate::metrics;

/// Index of the record closest to `hash` within `threshold`, with its distance.
///
/// Ties keep the earliest record, so load order decides.
pub fn best_match(records: &[PhashDbRecord], hash: u64, threshold: u32) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, record) in records.iter().enumerate() {
        let distance = hamming_distance(hash, record.hash);
        if distance > threshold {
            continue;
        }
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((i, distance)),
        }
    }
    best
}

/// Matches images against cached per-index hash tables.
///
/// Tables load on first use and stay cached for the life of the process
/// until [`PhashMatcher::invalidate`] is called.
pub struct PhashMatcher {
    source: Arc<dyn PhashRecordSource>,
    cache: RwLock<HashMap<String, Arc<Vec<PhashDbRecord>>>>,
}

impl PhashMatcher {
    pub fn new(source: Arc<dyn PhashRecordSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached records for an index, loading them on first use.
    pub async fn records(&self, spec: &PhashIndexSpec) -> Result<Arc<Vec<PhashDbRecord>>, PhashError> {
        if let Some(records) = self.cache.read().await.get(&spec.name) {
            return Ok(records.clone());
        }

        let mut cache = self.cache.write().await;
        if let Some(records) = cache.get(&spec.name) {
            return Ok(records.clone());
        }

        let rows = self.source.phash_rows(spec.content_type)?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match hash_from_hex(&row.hash) {
                Ok(hash) => records.push(PhashDbRecord {
                    id: row.id,
                    name: row.name,
                    external_ids: row.external_ids,
                    hash,
                }),
                Err(e) => warn!(index = %spec.name, id = %row.id, error = %e, "Skipping stored hash"),
            }
        }
        info!(index = %spec.name, records = records.len(), "Loaded phash index");
        metrics::PHASH_INDEX_LOADS.inc();

        let records = Arc::new(records);
        cache.insert(spec.name.clone(), records.clone());
        Ok(records)
    }

    pub async fn invalidate(&self, index: &str) {
        if self.cache.write().await.remove(index).is_some() {
            debug!(index = %index, "Invalidated phash index");
        }
    }

    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
        debug!("Invalidated all phash indexes");
    }

    /// Hash one input on the blocking pool.
    pub async fn hash_input(input: PhashInput) -> Result<Option<u64>, PhashError> {
        tokio::task::spawn_blocking(move || match input {
            PhashInput::Path(path) => {
                let bytes = std::fs::read(&path).map_err(|e| PhashError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                compute_phash(&bytes)
            }
            PhashInput::Bytes { data, .. } => compute_phash(&data),
        })
        .await
        .map_err(|e| PhashError::Task(e.to_string()))?
    }

    /// Hash every input and return the single closest record across all of them.
    ///
    /// Per-input failures are collected; only a failure to load the index
    /// fails the batch. The threshold is `max_distance` when given, else the
    /// index default.
    pub async fn find_best_match(
        &self,
        spec: &PhashIndexSpec,
        inputs: Vec<PhashInput>,
        max_distance: Option<u32>,
    ) -> Result<PhashBatch, PhashError> {
        let threshold = max_distance.unwrap_or(spec.default_max_distance);
        let records = self.records(spec).await?;
        let mut batch = PhashBatch::default();

        for input in inputs {
            let label = input.label();
            let hash = match Self::hash_input(input).await {
                Ok(Some(hash)) => hash,
                Ok(None) => {
                    batch.empty_inputs.push(label);
                    continue;
                }
                Err(e) => {
                    batch.failures.push(PhashFailure {
                        file_path: label,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            batch.hashes.push(PhashInputHash {
                input: label.clone(),
                hash,
            });

            let Some((index, distance)) = best_match(&records, hash, threshold) else {
                continue;
            };
            let better = match &batch.best {
                Some(current) => distance < current.distance,
                None => true,
            };
            if better {
                batch.best = Some(PhashDbMatch {
                    record: records[index].clone(),
                    distance,
                    input_phash: hash,
                    input: label,
                });
            }
        }

        if let Some(best) = &batch.best {
            debug!(
                index = %spec.name,
                id = %best.record.id,
                distance = best.distance,
                "Phash match"
            );
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phash::{hash_to_hex, phash_image, PhashRow};
    use crate::scraper::ContentType;
    use image::{DynamicImage, GrayImage, Luma};
    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource {
        rows: Vec<PhashRow>,
        loads: AtomicUsize,
    }

    impl PhashRecordSource for StaticSource {
        fn phash_rows(&self, _content_type: ContentType) -> Result<Vec<PhashRow>, PhashError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.clone())
        }
    }

    fn row(id: &str, hash: &str) -> PhashRow {
        PhashRow {
            id: id.to_string(),
            name: format!("Game {}", id),
            external_ids: BTreeMap::new(),
            hash: hash.to_string(),
        }
    }

    fn record(id: &str, hash: u64) -> PhashDbRecord {
        PhashDbRecord {
            id: id.to_string(),
            name: id.to_string(),
            external_ids: BTreeMap::new(),
            hash,
        }
    }

    fn spec() -> PhashIndexSpec {
        PhashIndexSpec::for_content_type(ContentType::Game, 10)
    }

    fn icon_png() -> (Vec<u8>, u64) {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(32, 32, |x, y| {
            Luma([(((x * 5 + y * 11) ^ (x + y * y)) % 220) as u8])
        }));
        let hash = phash_image(&img).unwrap();
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        (buf.into_inner(), hash)
    }

    #[test]
    fn test_best_match_respects_threshold() {
        let records = vec![record("a", 0b1111), record("b", 0b0111)];
        assert_eq!(best_match(&records, 0, 2), None);
        assert_eq!(best_match(&records, 0, 3), Some((1, 3)));
        assert_eq!(best_match(&records, 0b0111, 10), Some((1, 0)));
    }

    #[test]
    fn test_best_match_tie_keeps_first_loaded() {
        let records = vec![record("first", 0b01), record("second", 0b10)];
        assert_eq!(best_match(&records, 0, 8), Some((0, 1)));
    }

    #[tokio::test]
    async fn test_index_cached_until_invalidated() {
        let source = Arc::new(StaticSource {
            rows: vec![row("1", "00000000000000ff"), row("bad", "not-hex")],
            loads: AtomicUsize::new(0),
        });
        let matcher = PhashMatcher::new(source.clone());

        let records = matcher.records(&spec()).await.unwrap();
        assert_eq!(records.len(), 1);
        matcher.records(&spec()).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        matcher.invalidate(&spec().name).await;
        matcher.records(&spec()).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);

        matcher.invalidate_all().await;
        matcher.records(&spec()).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_find_best_match_collects_failures() {
        let (png, hash) = icon_png();
        let source = Arc::new(StaticSource {
            rows: vec![row("far", &hash_to_hex(!hash)), row("near", &hash_to_hex(hash ^ 0b11))],
            loads: AtomicUsize::new(0),
        });
        let matcher = PhashMatcher::new(source);

        let batch = matcher
            .find_best_match(
                &spec(),
                vec![
                    PhashInput::Path("/nonexistent/icon.png".into()),
                    PhashInput::Bytes {
                        label: "garbage".to_string(),
                        data: b"nope".to_vec(),
                    },
                    PhashInput::Bytes {
                        label: "icon".to_string(),
                        data: png,
                    },
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(batch.failures.len(), 2);
        assert_eq!(batch.hashes.len(), 1);
        let best = batch.best.unwrap();
        assert_eq!(best.record.id, "near");
        assert_eq!(best.distance, 2);
        assert_eq!(best.input, "icon");
    }

    #[tokio::test]
    async fn test_override_threshold() {
        let (png, hash) = icon_png();
        let source = Arc::new(StaticSource {
            rows: vec![row("near", &hash_to_hex(hash ^ 0b111))],
            loads: AtomicUsize::new(0),
        });
        let matcher = PhashMatcher::new(source);
        let input = || {
            vec![PhashInput::Bytes {
                label: "icon".to_string(),
                data: png.clone(),
            }]
        };

        let strict = matcher.find_best_match(&spec(), input(), Some(2)).await.unwrap();
        assert!(strict.best.is_none());
        let loose = matcher.find_best_match(&spec(), input(), None).await.unwrap();
        assert_eq!(loose.best.unwrap().distance, 3);
    }
}
