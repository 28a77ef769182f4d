//! # Batch Photo Ingestion
//!
//! A post may carry several photos, picked from files, uploaded as raw bytes, or pasted
//! as ready-made `data:` URLs. [`ImageBatch`] takes all of them in the order the user
//! attached them and yields one result per source, in that same order, once every
//! source has settled.
//!
//! ## Guarantees
//!
//! - Slot `i` of the output always belongs to source `i`, whatever order the reads
//!   finish in. The first attached photo therefore stays the post's cover.
//! - A source that fails to decode leaves its slot empty (`None`). The failure is
//!   logged and the rest of the batch carries on.
//! - The completion consumer given to [`ImageBatch::settle_then`] runs exactly once.
//! - An empty batch completes on its first poll.
//!
//! Decodes are interleaved on the calling task; nothing is spawned, retried, or
//! timed out. Each batch owns its sources and its results, so concurrent batches
//! never observe each other.

use crate::photo::{DecodeError, EncodedImage};
use bytes::Bytes;
use futures::future::join_all;
use std::{future::Future, path::PathBuf, str::FromStr};

/// Raw image content that still has to be read and encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Blob {
    /// A photo on the local filesystem.
    File(PathBuf),
    /// Photo bytes already in memory, e.g. from an upload.
    Bytes(Bytes),
}

/// One photo attached to a post.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Needs an asynchronous decode.
    Raw(Blob),
    /// Already in final form.
    PreEncoded(EncodedImage),
}

impl ImageSource {
    pub fn file<P: Into<PathBuf>>(path: P) -> Self {
        ImageSource::Raw(Blob::File(path.into()))
    }

    pub fn bytes<B: Into<Bytes>>(bytes: B) -> Self {
        ImageSource::Raw(Blob::Bytes(bytes.into()))
    }

    pub fn pre_encoded(image: EncodedImage) -> Self {
        ImageSource::PreEncoded(image)
    }
}

/// Classifies a command-line style argument: `data:` URLs are pre-encoded, anything
/// else is a file path.
impl FromStr for ImageSource {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("data:") {
            Ok(ImageSource::PreEncoded(EncodedImage::parse(s)?))
        } else {
            Ok(ImageSource::file(s))
        }
    }
}

/// Turns a [`Blob`] into an [`EncodedImage`].
pub trait Decode {
    fn decode(&self, blob: &Blob) -> impl Future<Output = Result<EncodedImage, DecodeError>> + Send;
}

/// The production decoder: reads files with `tokio::fs` and encodes them as `data:` URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataUrlDecoder;

impl Decode for DataUrlDecoder {
    async fn decode(&self, blob: &Blob) -> Result<EncodedImage, DecodeError> {
        let bytes = match blob {
            Blob::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|source| DecodeError::Read {
                    path: path.clone(),
                    source,
                })?,
            Blob::Bytes(bytes) => bytes.clone(),
        };

        EncodedImage::encode(&bytes)
    }
}

/// The photos attached to a single post submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageBatch {
    sources: Vec<ImageSource>,
}

impl ImageBatch {
    pub fn new<I: IntoIterator<Item = ImageSource>>(sources: I) -> Self {
        ImageBatch {
            sources: sources.into_iter().collect(),
        }
    }

    /// Attaches one more source after the existing ones.
    pub fn push(&mut self, source: ImageSource) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Settles every source and returns the results in submission order.
    ///
    /// The returned vector always has one entry per source; failed decodes are `None`.
    pub async fn settle<D: Decode>(self, decoder: &D) -> Vec<Option<EncodedImage>> {
        let total = self.sources.len();

        let slots = join_all(
            self.sources
                .into_iter()
                .enumerate()
                .map(|(slot, source)| settle_one(decoder, slot, source)),
        )
        .await;

        tracing::debug!(
            total,
            absent = slots.iter().filter(|s| s.is_none()).count(),
            "image batch settled"
        );

        slots
    }

    /// Settles the batch, then hands the ordered results to `on_complete`.
    pub async fn settle_then<D, F, T>(self, decoder: &D, on_complete: F) -> T
    where
        D: Decode,
        F: FnOnce(Vec<Option<EncodedImage>>) -> T,
    {
        let slots = self.settle(decoder).await;
        on_complete(slots)
    }
}

impl FromIterator<ImageSource> for ImageBatch {
    fn from_iter<I: IntoIterator<Item = ImageSource>>(iter: I) -> Self {
        ImageBatch::new(iter)
    }
}

async fn settle_one<D: Decode>(
    decoder: &D,
    slot: usize,
    source: ImageSource,
) -> Option<EncodedImage> {
    match source {
        ImageSource::PreEncoded(image) => Some(image),
        ImageSource::Raw(blob) => match decoder.decode(&blob).await {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(slot, error = %e, "photo could not be decoded, leaving slot empty");
                None
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{Blob, DataUrlDecoder, Decode, ImageBatch, ImageSource};
    use crate::photo::{
        DecodeError, EncodedImage,
        tests::{png_bytes, png_data_url},
    };
    use futures::FutureExt;
    use std::{
        collections::HashMap,
        sync::{
            Arc, Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tempfile::TempDir;

    /// Decodes `Blob::Bytes(label)` to `label` after a per-label delay, recording the
    /// order in which decodes finish. Labels starting with `!` fail.
    #[derive(Default)]
    struct ScriptedDecoder {
        delays: HashMap<String, u64>,
        finished: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedDecoder {
        fn with_delays(delays: &[(&str, u64)]) -> Self {
            ScriptedDecoder {
                delays: delays
                    .iter()
                    .map(|(label, ms)| (label.to_string(), *ms))
                    .collect(),
                ..Default::default()
            }
        }

        fn finished(&self) -> Vec<String> {
            self.finished.lock().unwrap().clone()
        }
    }

    impl Decode for ScriptedDecoder {
        async fn decode(&self, blob: &Blob) -> Result<EncodedImage, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let Blob::Bytes(bytes) = blob else {
                return Err(DecodeError::MalformedDataUrl);
            };
            let label = String::from_utf8(bytes.to_vec()).unwrap();
            let delay = self.delays.get(&label).copied().unwrap_or(0);

            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.finished.lock().unwrap().push(label.clone());

            if label.starts_with('!') {
                Err(DecodeError::MalformedDataUrl)
            } else {
                Ok(EncodedImage::from(label))
            }
        }
    }

    fn raw(label: &str) -> ImageSource {
        ImageSource::bytes(label.as_bytes().to_vec())
    }

    fn encoded(label: &str) -> Option<EncodedImage> {
        Some(EncodedImage::from(label.to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_independent_of_completion_order() {
        let permutations = [
            [10, 20, 30],
            [10, 30, 20],
            [20, 10, 30],
            [20, 30, 10],
            [30, 10, 20],
            [30, 20, 10],
        ];

        for delays in permutations {
            let decoder = ScriptedDecoder::with_delays(&[
                ("a", delays[0]),
                ("b", delays[1]),
                ("c", delays[2]),
            ]);
            let batch = ImageBatch::new([raw("a"), raw("b"), raw("c")]);

            let results = batch.settle(&decoder).await;

            assert_eq!(vec![encoded("a"), encoded("b"), encoded("c")], results);

            // The decodes really did finish in delay order.
            let mut expected = vec![("a", delays[0]), ("b", delays[1]), ("c", delays[2])];
            expected.sort_by_key(|(_, delay)| *delay);
            assert_eq!(
                expected
                    .into_iter()
                    .map(|(label, _)| label.to_string())
                    .collect::<Vec<_>>(),
                decoder.finished()
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_runs_once_after_all_settled() {
        let decoder = ScriptedDecoder::with_delays(&[("a", 50), ("b", 5), ("c", 25)]);
        let invocations = AtomicUsize::new(0);

        let seen = ImageBatch::new([raw("a"), raw("b"), raw("c")])
            .settle_then(&decoder, |results| {
                invocations.fetch_add(1, Ordering::SeqCst);
                // Every decode has finished by the time the consumer runs.
                assert_eq!(3, decoder.finished().len());
                results.len()
            })
            .await;

        assert_eq!(3, seen);
        assert_eq!(1, invocations.load(Ordering::SeqCst));
        assert_eq!(3, decoder.calls.load(Ordering::SeqCst));
    }

    #[test]
    fn test_empty_batch_completes_immediately() {
        let decoder = ScriptedDecoder::default();

        let results = ImageBatch::default().settle(&decoder).now_or_never();

        assert_eq!(Some(vec![]), results);
        assert_eq!(0, decoder.calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_leaves_one_empty_slot() {
        let decoder = ScriptedDecoder::with_delays(&[("a", 30), ("!b", 10), ("c", 20)]);
        let invocations = AtomicUsize::new(0);

        let results = ImageBatch::new([raw("a"), raw("!b"), raw("c")])
            .settle_then(&decoder, |results| {
                invocations.fetch_add(1, Ordering::SeqCst);
                results
            })
            .await;

        assert_eq!(vec![encoded("a"), None, encoded("c")], results);
        assert_eq!(1, invocations.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_encoded_and_raw_keep_submission_order() {
        for delay in [0, 40] {
            let decoder = ScriptedDecoder::with_delays(&[("B", delay)]);
            let batch = ImageBatch::new([
                ImageSource::pre_encoded(EncodedImage::from("A".to_string())),
                raw("B"),
            ]);

            assert_eq!(
                vec![encoded("A"), encoded("B")],
                batch.settle(&decoder).await
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_batches_are_isolated() {
        let decoder = Arc::new(ScriptedDecoder::with_delays(&[
            ("first-1", 100),
            ("first-2", 60),
            ("second-1", 5),
        ]));

        let first = ImageBatch::new([raw("first-1"), raw("first-2")]);
        let second = ImageBatch::new([raw("second-1"), raw("!second-2")]);

        let (first, second) = tokio::join!(first.settle(&*decoder), second.settle(&*decoder));

        assert_eq!(vec![encoded("first-1"), encoded("first-2")], first);
        assert_eq!(vec![encoded("second-1"), None], second);
    }

    #[tokio::test]
    async fn test_data_url_decoder_reads_files() {
        let tmp_dir = TempDir::new().unwrap();
        let photo_path = tmp_dir.path().join("facade.png");
        std::fs::write(&photo_path, png_bytes()).unwrap();
        let text_path = tmp_dir.path().join("notes.txt");
        std::fs::write(&text_path, "not a photo").unwrap();

        let batch = ImageBatch::new([
            ImageSource::file(&photo_path),
            ImageSource::file(tmp_dir.path().join("missing.png")),
            ImageSource::file(&text_path),
            ImageSource::bytes(png_bytes()),
        ]);

        let results = batch.settle(&DataUrlDecoder).await;

        assert_eq!(4, results.len());
        assert!(
            results[0]
                .as_ref()
                .is_some_and(|img| img.mime_type() == Some("image/png"))
        );
        assert_eq!(None, results[1]);
        assert_eq!(None, results[2]);
        assert_eq!(results[0], results[3]);
    }

    #[test]
    fn test_source_from_argument() {
        assert_eq!(
            ImageSource::file("photos/jongmyo.jpg"),
            "photos/jongmyo.jpg".parse::<ImageSource>().unwrap()
        );
        assert_eq!(
            ImageSource::pre_encoded(EncodedImage::encode(&png_bytes()).unwrap()),
            png_data_url(2, 3).parse::<ImageSource>().unwrap()
        );
        assert!("data:text/plain;base64,aGk=".parse::<ImageSource>().is_err());
        assert!("data:image/png;base64,!!!!".parse::<ImageSource>().is_err());
    }
}
