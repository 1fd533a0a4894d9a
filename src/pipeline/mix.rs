use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::audio::{AudioBuffer, decode_audio, encode_wav};
use crate::pipeline::voice::VoiceTrack;

const INTRO_FADE_MS: u64 = 3_000;
const INTRO_GAIN_DB: f32 = -6.0;
const VOICE_HEADROOM_DB: f32 = 0.1;
const SILENT_INTRO_MS: u64 = 3_000;
const SILENT_INTRO_NAME: &str = "silence";

/// ミックス済みエピソード。WAV バイト列と、永続化に回すメタデータを運ぶ。
#[derive(Debug)]
pub(crate) struct MixedEpisode {
    pub(crate) wav: Vec<u8>,
    pub(crate) duration_seconds: f64,
    pub(crate) voice_id: String,
    pub(crate) intro_stinger: String,
}

#[async_trait]
pub(crate) trait MixStage: Send + Sync {
    async fn mix(&self, voice: VoiceTrack) -> Result<MixedEpisode>;
}

/// イントロ素材のディレクトリと候補ファイル名の束。
pub(crate) struct StingerLibrary {
    dir: PathBuf,
    names: Vec<String>,
}

impl StingerLibrary {
    pub(crate) fn new(dir: impl Into<PathBuf>, names: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            names,
        }
    }

    fn pick(&self, rng: &mut StdRng) -> Option<&str> {
        self.names.choose(rng).map(String::as_str)
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// ランダムに選んだイントロをナレーションの頭に重ねるミキサー。
///
/// 素材が読めない・復号できない場合は無音イントロで続行する。
/// 記録されるスティンガー名は選択したファイル名のままにする。
pub(crate) struct StingerMixStage {
    stingers: StingerLibrary,
    rng: Mutex<StdRng>,
}

impl StingerMixStage {
    pub(crate) fn new(stingers: StingerLibrary) -> Self {
        Self::with_rng(stingers, StdRng::from_os_rng())
    }

    /// シード固定でイントロ選択を再現するテスト用コンストラクタ。
    #[cfg(test)]
    pub(crate) fn with_seed(stingers: StingerLibrary, seed: u64) -> Self {
        Self::with_rng(stingers, StdRng::seed_from_u64(seed))
    }

    fn with_rng(stingers: StingerLibrary, rng: StdRng) -> Self {
        Self {
            stingers,
            rng: Mutex::new(rng),
        }
    }

    async fn load_intro(&self, name: &str, sample_rate: u32) -> AudioBuffer {
        let path = self.stingers.path_for(name);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(
                    stinger = name,
                    path = %path.display(),
                    error = %error,
                    "intro stinger unreadable, substituting silence"
                );
                return AudioBuffer::silence(SILENT_INTRO_MS, sample_rate);
            }
        };

        let hint = path.extension().and_then(|ext| ext.to_str());
        match decode_audio(bytes, hint) {
            Ok(buffer) => buffer,
            Err(error) => {
                warn!(
                    stinger = name,
                    error = ?error,
                    "intro stinger undecodable, substituting silence"
                );
                AudioBuffer::silence(SILENT_INTRO_MS, sample_rate)
            }
        }
    }
}

#[async_trait]
impl MixStage for StingerMixStage {
    async fn mix(&self, voice: VoiceTrack) -> Result<MixedEpisode> {
        let mut narration =
            decode_audio(voice.audio, Some("mp3")).context("failed to decode narration audio")?;

        let stinger = {
            let mut rng = self.rng.lock().await;
            self.stingers.pick(&mut rng).map(str::to_string)
        };

        let mut intro = match &stinger {
            Some(name) => self.load_intro(name, narration.sample_rate()).await,
            None => {
                debug!("no intro stingers configured, using silence");
                AudioBuffer::silence(SILENT_INTRO_MS, narration.sample_rate())
            }
        };

        if intro.sample_rate() != narration.sample_rate() {
            intro = intro.resampled(narration.sample_rate());
        }

        // イントロのテールをフェードし、全体を -6dB に落としてから合成する。
        // ナレーション側はピーク正規化のみ。
        intro.fade_out_tail(INTRO_FADE_MS);
        narration.normalize_peak(VOICE_HEADROOM_DB);
        intro.apply_gain_db(INTRO_GAIN_DB);

        let mixed = intro
            .overlay(&narration)
            .context("failed to overlay intro and narration")?;
        let wav = encode_wav(&mixed).context("failed to encode mixed episode")?;

        Ok(MixedEpisode {
            wav,
            duration_seconds: mixed.duration_seconds(),
            voice_id: voice.voice_id,
            intro_stinger: stinger.unwrap_or_else(|| SILENT_INTRO_NAME.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_fixture(frames: usize, value: f32, sample_rate: u32) -> Vec<u8> {
        let buffer = AudioBuffer::new(vec![value; frames * 2], sample_rate).expect("valid buffer");
        encode_wav(&buffer).expect("encodable fixture")
    }

    fn voice_track(frames: usize, sample_rate: u32) -> VoiceTrack {
        VoiceTrack {
            audio: wav_fixture(frames, 0.5, sample_rate),
            voice_id: "narrator".to_string(),
        }
    }

    #[tokio::test]
    async fn mix_keeps_the_full_narration_under_a_longer_intro() {
        let dir = tempfile::tempdir().expect("tempdir");
        // 22.05kHz の 4 秒イントロ。44.1kHz のナレーションに合わせてリサンプルされる。
        std::fs::write(
            dir.path().join("intro.wav"),
            wav_fixture(4 * 22_050, 0.8, 22_050),
        )
        .expect("fixture written");

        let stage = StingerMixStage::with_seed(
            StingerLibrary::new(dir.path(), vec!["intro.wav".to_string()]),
            7,
        );

        let episode = stage
            .mix(voice_track(2 * 44_100, 44_100))
            .await
            .expect("mix succeeds");

        assert_eq!(episode.intro_stinger, "intro.wav");
        assert_eq!(episode.voice_id, "narrator");
        assert!(episode.duration_seconds >= 2.0, "narration must survive");
        assert!((episode.duration_seconds - 4.0).abs() < 0.05);
    }

    #[tokio::test]
    async fn mix_is_deterministic_for_a_fixed_seed() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("a.wav"),
            wav_fixture(22_050, 0.2, 22_050),
        )
        .expect("fixture written");
        std::fs::write(
            dir.path().join("b.wav"),
            wav_fixture(44_100, 0.9, 22_050),
        )
        .expect("fixture written");

        let names = vec!["a.wav".to_string(), "b.wav".to_string()];
        let first = StingerMixStage::with_seed(StingerLibrary::new(dir.path(), names.clone()), 42)
            .mix(voice_track(44_100, 44_100))
            .await
            .expect("first mix succeeds");
        let second = StingerMixStage::with_seed(StingerLibrary::new(dir.path(), names), 42)
            .mix(voice_track(44_100, 44_100))
            .await
            .expect("second mix succeeds");

        assert_eq!(first.intro_stinger, second.intro_stinger);
        assert_eq!(first.wav, second.wav);
    }

    #[tokio::test]
    async fn mix_substitutes_silence_for_a_missing_stinger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = StingerMixStage::with_seed(
            StingerLibrary::new(dir.path(), vec!["missing.wav".to_string()]),
            1,
        );

        let episode = stage
            .mix(voice_track(44_100, 44_100))
            .await
            .expect("mix succeeds");

        // 選択されたファイル名は記録に残る。無音の長さが出力長を決める。
        assert_eq!(episode.intro_stinger, "missing.wav");
        assert!((episode.duration_seconds - 3.0).abs() < 0.05);
    }

    #[tokio::test]
    async fn mix_substitutes_silence_for_an_undecodable_stinger() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("broken.wav"), b"not audio at all").expect("fixture");

        let stage = StingerMixStage::with_seed(
            StingerLibrary::new(dir.path(), vec!["broken.wav".to_string()]),
            1,
        );

        let episode = stage
            .mix(voice_track(5 * 44_100, 44_100))
            .await
            .expect("mix succeeds");

        assert_eq!(episode.intro_stinger, "broken.wav");
        assert!((episode.duration_seconds - 5.0).abs() < 0.05);
    }

    #[tokio::test]
    async fn mix_handles_an_empty_stinger_library() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = StingerMixStage::with_seed(StingerLibrary::new(dir.path(), vec![]), 1);

        let episode = stage
            .mix(voice_track(5 * 44_100, 44_100))
            .await
            .expect("mix succeeds");

        assert_eq!(episode.intro_stinger, "silence");
        assert!((episode.duration_seconds - 5.0).abs() < 0.05);
    }

    #[tokio::test]
    async fn mix_rejects_undecodable_narration() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stage = StingerMixStage::with_seed(StingerLibrary::new(dir.path(), vec![]), 1);

        let error = stage
            .mix(VoiceTrack {
                audio: b"definitely not audio".to_vec(),
                voice_id: "narrator".to_string(),
            })
            .await
            .expect_err("mix must fail");

        assert!(format!("{error:#}").contains("narration"));
    }
}
