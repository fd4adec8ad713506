//! End-to-end runs against scripted backends.  No network access.

use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use tempfile::TempDir;
use ttsgen::{
    normalize::encode_canonical_wav,
    pacing::{ManualClock, Pacer},
    AudioEncoding, BackendError, BackendKind, CanonicalAudioSpec, Generator, GeneratorConfig,
    Manifest, ManifestEntry, Normalizer, RawAudio, SpeechBackend,
};

// ─── Test backend ────────────────────────────────────────────────────────────

/// Answers every request with a short tone unless the text is in `fail`.
struct FakeBackend {
    calls: Arc<Mutex<Vec<String>>>,
    fail: HashSet<String>,
    payload: fn() -> RawAudio,
}

fn canonical_tone() -> RawAudio {
    let samples: Vec<i16> = (0..4410).map(|i| ((i % 100) as i16 - 50) * 100).collect();
    RawAudio::new(encode_canonical_wav(&samples).unwrap(), AudioEncoding::Wav)
}

fn stereo_pcm_22k() -> RawAudio {
    let mut bytes = Vec::new();
    for i in 0..2205i16 {
        let s = (i % 50) * 200;
        bytes.extend_from_slice(&s.to_le_bytes());
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    RawAudio::new(bytes, AudioEncoding::Pcm16 { sample_rate: 22_050, channels: 2 })
}

fn mp3_frames() -> RawAudio {
    RawAudio::new(b"ID3\x03\x00 frames".to_vec(), AudioEncoding::Mp3)
}

fn truncated_wav() -> RawAudio {
    let mut bytes = encode_canonical_wav(&[100; 2000]).unwrap();
    bytes.truncate(200);
    RawAudio::new(bytes, AudioEncoding::Wav)
}

impl FakeBackend {
    fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (Self { calls: calls.clone(), fail: HashSet::new(), payload: canonical_tone }, calls)
    }

    fn failing(mut self, text: &str) -> Self {
        self.fail.insert(text.to_string());
        self
    }

    fn with_payload(mut self, payload: fn() -> RawAudio) -> Self {
        self.payload = payload;
        self
    }
}

impl SpeechBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gtts
    }

    fn synthesize(&self, text: &str, _voice_hint: &str) -> Result<RawAudio, BackendError> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail.contains(text) {
            return Err(BackendError::Provider {
                backend: BackendKind::Gtts,
                status: 400,
                message: "bad request".into(),
            });
        }
        Ok((self.payload)())
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn manifest(n: u32) -> Manifest {
    let entries = (1..=n)
        .map(|i| ManifestEntry::new(1 + i % 3, format!("word{i}"), 1, format!("Sentence number {i}.")))
        .collect();
    Manifest::from_entries(entries).unwrap()
}

fn cat_manifest() -> Manifest {
    Manifest::from_entries(vec![
        ManifestEntry::new(1, "cat", 1, "The cat is sleeping."),
        ManifestEntry::new(1, "cat", 2, "I saw a cat."),
    ])
    .unwrap()
}

fn generator(backend: FakeBackend, root: &Path, batch: usize, clock: &Arc<ManualClock>) -> Generator {
    Generator::new(Box::new(backend), root)
        .with_pacer(Pacer::new(batch, Duration::from_secs(2)))
        .with_clock(clock.clone())
}

fn assert_canonical(path: &Path) {
    let reader = hound::WavReader::open(path).unwrap();
    assert!(CanonicalAudioSpec::matches(&reader.spec()), "{}", path.display());
    assert!(reader.len() > 0);
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn test_fresh_run_generates_all_and_pauses_between_batches() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let (backend, calls) = FakeBackend::new();
    let summary = generator(backend, tmp.path(), 1, &clock).run(&cat_manifest());

    assert_eq!((summary.generated, summary.skipped, summary.failed), (2, 0, 0));
    assert_eq!(summary.pauses, 1);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(2)]);
    assert_eq!(calls.lock().unwrap().len(), 2);
    assert_canonical(&tmp.path().join("difficulty_1/cat_sentence1.wav"));
    assert_canonical(&tmp.path().join("difficulty_1/cat_sentence2.wav"));
    assert!(summary.is_success());
}

#[test]
fn test_existing_clip_is_skipped_and_failure_is_recorded() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let m = cat_manifest();

    let (seed, _) = FakeBackend::new();
    let seeder = generator(seed, tmp.path(), 10, &clock);
    seeder.materializer().commit(&m.entries()[0], &canonical_tone().bytes).unwrap();

    let (backend, calls) = FakeBackend::new();
    let backend = backend.failing("I saw a cat.");
    let summary = generator(backend, tmp.path(), 10, &clock).run(&m);

    assert_eq!((summary.generated, summary.skipped, summary.failed), (0, 1, 1));
    assert_eq!(*calls.lock().unwrap(), vec!["I saw a cat.".to_string()]);
    assert_eq!(summary.failures[0].output_file, "difficulty_1/cat_sentence2.wav");
    assert!(!tmp.path().join("difficulty_1/cat_sentence2.wav").exists());
    assert!(!summary.is_success());
}

#[test]
fn test_second_run_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let m = manifest(7);

    let (first, _) = FakeBackend::new();
    let s1 = generator(first, tmp.path(), 3, &clock).run(&m);
    assert_eq!(s1.generated, 7);

    let (second, calls) = FakeBackend::new();
    let s2 = generator(second, tmp.path(), 3, &clock).run(&m);
    assert_eq!((s2.generated, s2.skipped, s2.failed), (0, 7, 0));
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn test_resume_only_calls_backend_for_gaps() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let m = manifest(10);

    let (seed, _) = FakeBackend::new();
    let seeder = generator(seed, tmp.path(), 10, &clock);
    for entry in m.entries().iter().step_by(3) {
        seeder.materializer().commit(entry, &canonical_tone().bytes).unwrap();
    }
    let already = m.entries().iter().step_by(3).count();

    let (backend, calls) = FakeBackend::new();
    let summary = generator(backend, tmp.path(), 10, &clock).run(&m);
    assert_eq!(summary.skipped, already);
    assert_eq!(summary.generated, 10 - already);
    assert_eq!(calls.lock().unwrap().len(), 10 - already);
}

#[test]
fn test_pause_count_follows_batch_size() {
    for (n, b) in [(1, 1), (25, 10), (30, 10), (9, 4)] {
        let tmp = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new());
        let (backend, _) = FakeBackend::new();
        let summary = generator(backend, tmp.path(), b, &clock).run(&manifest(n));
        let expected = (n as usize - 1) / b;
        assert_eq!(summary.pauses, expected, "n={n} b={b}");
        assert_eq!(clock.sleeps().len(), expected);
    }
}

#[test]
fn test_counts_always_sum_to_total() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let m = manifest(12);
    let (seed, _) = FakeBackend::new();
    generator(seed, tmp.path(), 5, &clock).materializer().commit(&m.entries()[4], &canonical_tone().bytes).unwrap();

    let (backend, _) = FakeBackend::new();
    let backend = backend.failing("Sentence number 2.").failing("Sentence number 9.");
    let summary = generator(backend, tmp.path(), 5, &clock).run(&m);

    assert_eq!((summary.generated, summary.skipped, summary.failed), (9, 1, 2));
    assert_eq!(summary.processed(), summary.total);
    assert_eq!(summary.total, 12);
}

#[test]
fn test_payload_is_normalised_before_commit() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let (backend, _) = FakeBackend::new();
    let backend = backend.with_payload(stereo_pcm_22k);
    let summary = generator(backend, tmp.path(), 10, &clock).run(&cat_manifest());

    assert_eq!(summary.generated, 2);
    let path = tmp.path().join("difficulty_1/cat_sentence1.wav");
    assert_canonical(&path);
    // 0.1 s at 22.05 kHz becomes 0.1 s at 44.1 kHz.
    let frames = hound::WavReader::open(&path).unwrap().duration();
    assert!((4400..=4420).contains(&frames), "frames={frames}");
}

#[test]
fn test_undecodable_payload_leaves_no_file() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let (backend, _) = FakeBackend::new();
    let backend = backend.with_payload(truncated_wav);
    let summary = generator(backend, tmp.path(), 10, &clock).run(&cat_manifest());

    assert_eq!(summary.failed, 2);
    assert_eq!(summary.failures[0].kind, "normalize");
    let dir = tmp.path().join("difficulty_1");
    let leftovers: Vec<_> = std::fs::read_dir(&dir)
        .map(|it| it.map(|e| e.unwrap().path()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn test_placeholder_backend_fails_every_entry_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let manifest_path = tmp.path().join("SENTENCES_AUDIO_BATCH.json");
    std::fs::write(
        &manifest_path,
        r#"{
            "metadata": { "voice": "lisa", "format": "wav" },
            "sentences": [
                { "difficulty": 1, "word": "cat", "sentenceNumber": 1,
                  "text": "The cat is sleeping.", "outputFile": "difficulty_1/cat_sentence1.wav" },
                { "difficulty": 2, "word": "dog", "sentenceNumber": 1,
                  "text": "The dog runs.", "outputFile": "difficulty_2/dog_sentence1.wav" }
            ]
        }"#,
    )
    .unwrap();

    let config = GeneratorConfig {
        backend: BackendKind::Playht,
        api_key: Some("key".into()),
        output_dir: tmp.path().join("out"),
        pause_seconds: 0.0,
        ..Default::default()
    };

    let all = ttsgen::generate(&config, &manifest_path, None).unwrap();
    assert_eq!((all.total, all.failed), (2, 2));
    assert!(all.failures.iter().all(|f| f.kind == "not_implemented"));
    assert!(!tmp.path().join("out/difficulty_1/cat_sentence1.wav").exists());

    let tier = ttsgen::generate(&config, &manifest_path, Some(2)).unwrap();
    assert_eq!(tier.total, 1);
    assert_eq!(tier.failures[0].key, "dog");
}

#[test]
fn test_truncated_clip_is_regenerated() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let m = Manifest::from_entries(vec![ManifestEntry::new(1, "cat", 1, "The cat is sleeping.")]).unwrap();
    let target = tmp.path().join("difficulty_1/cat_sentence1.wav");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(&target, truncated_wav().bytes).unwrap();

    let (backend, calls) = FakeBackend::new();
    let summary = generator(backend, tmp.path(), 10, &clock).run(&m);

    assert_eq!((summary.generated, summary.skipped, summary.failed), (1, 0, 0));
    assert_eq!(calls.lock().unwrap().len(), 1);
    assert_canonical(&target);
}

#[test]
fn test_fallback_clip_replaces_corrupt_wav() {
    let tmp = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new());
    let m = Manifest::from_entries(vec![ManifestEntry::new(1, "cat", 1, "The cat is sleeping.")]).unwrap();
    let target = tmp.path().join("difficulty_1/cat_sentence1.wav");
    std::fs::create_dir_all(target.parent().unwrap()).unwrap();
    std::fs::write(&target, b"RIFF garbage").unwrap();

    let (backend, calls) = FakeBackend::new();
    let g = generator(backend.with_payload(mp3_frames), tmp.path(), 10, &clock)
        .with_normalizer(Normalizer::new().with_mp3(false))
        .with_raw_fallback(true);

    let summary = g.run(&m);
    assert_eq!((summary.generated, summary.degraded), (1, 1));
    assert!(!target.exists());
    assert!(tmp.path().join("difficulty_1/cat_sentence1.mp3").is_file());

    let again = g.run(&m);
    assert_eq!(again.skipped, 1);
    assert_eq!(calls.lock().unwrap().len(), 1);
}
