#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use anyhow::{Result, bail};

/// デコード済み音声のインメモリ表現。
///
/// サンプルは常にステレオ・インターリーブ（`[L, R, L, R, ...]`）の f32 で保持する。
/// モノラル音源はデコード時に複製され、多チャンネル音源はダウンミックスされる。
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// インターリーブ済みサンプルからバッファを構築する。
    ///
    /// # Errors
    /// サンプル数が奇数（ステレオフレームとして不正）、またはサンプルレートが
    /// 0 の場合はエラーを返す。
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if samples.len() % 2 != 0 {
            bail!("stereo sample count must be even, got {}", samples.len());
        }
        if sample_rate == 0 {
            bail!("sample rate must be positive");
        }
        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// 指定した長さの無音バッファを生成する。
    #[must_use]
    pub fn silence(duration_ms: u64, sample_rate: u32) -> Self {
        let frames = (u64::from(sample_rate) * duration_ms / 1000) as usize;
        Self {
            samples: vec![0.0; frames * 2],
            sample_rate,
        }
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    /// 絶対値の最大振幅を返す。
    #[must_use]
    pub fn peak(&self) -> f32 {
        self.samples.iter().map(|s| s.abs()).fold(0.0_f32, f32::max)
    }

    /// バッファ末尾に線形フェードアウトを適用する。
    ///
    /// フェード窓がバッファより長い場合は全体をフェードする。最終フレームの
    /// 乗数はちょうど 0.0 になる。
    pub fn fade_out_tail(&mut self, fade_ms: u64) {
        let frames = self.frames();
        let fade_frames =
            ((u64::from(self.sample_rate) * fade_ms / 1000) as usize).min(frames);
        if fade_frames == 0 {
            return;
        }
        let start = frames - fade_frames;
        for i in 0..fade_frames {
            let multiplier = 1.0 - (i + 1) as f32 / fade_frames as f32;
            let frame = start + i;
            self.samples[frame * 2] *= multiplier;
            self.samples[frame * 2 + 1] *= multiplier;
        }
    }

    /// デシベル指定のゲインを全サンプルに適用する。負の値で減衰。
    pub fn apply_gain_db(&mut self, gain_db: f32) {
        let factor = 10.0_f32.powf(gain_db / 20.0);
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// ピーク基準でラウドネスを正規化する。
    ///
    /// 最大振幅が `-headroom_db` dBFS になるようスケールする。無音バッファは
    /// そのまま返す。
    pub fn normalize_peak(&mut self, headroom_db: f32) {
        let peak = self.peak();
        if peak <= 0.0 {
            return;
        }
        let target = 10.0_f32.powf(-headroom_db / 20.0);
        let scale = target / peak;
        for sample in &mut self.samples {
            *sample *= scale;
        }
    }

    /// 別バッファを先頭位置から重ね合わせた新しいバッファを返す。
    ///
    /// 信号は加算合成され、出力長は両者の長い方になる。クリップ制限は
    /// エンコード時に行う。
    ///
    /// # Errors
    /// サンプルレートが一致しない場合はエラーを返す。
    pub fn overlay(&self, other: &Self) -> Result<Self> {
        if self.sample_rate != other.sample_rate {
            bail!(
                "sample rate mismatch: {} vs {}",
                self.sample_rate,
                other.sample_rate
            );
        }
        let mut mixed = vec![0.0_f32; self.samples.len().max(other.samples.len())];
        for (out, &sample) in mixed.iter_mut().zip(&self.samples) {
            *out += sample;
        }
        for (out, &sample) in mixed.iter_mut().zip(&other.samples) {
            *out += sample;
        }
        Ok(Self {
            samples: mixed,
            sample_rate: self.sample_rate,
        })
    }

    /// 線形補間で指定サンプルレートに変換したコピーを返す。
    #[must_use]
    pub fn resampled(&self, target_rate: u32) -> Self {
        if target_rate == self.sample_rate || self.samples.is_empty() {
            return Self {
                samples: self.samples.clone(),
                sample_rate: target_rate,
            };
        }
        let src_frames = self.frames();
        let new_frames =
            (src_frames as u64 * u64::from(target_rate) / u64::from(self.sample_rate)) as usize;
        let step = f64::from(self.sample_rate) / f64::from(target_rate);
        let mut samples = Vec::with_capacity(new_frames * 2);
        for i in 0..new_frames {
            let pos = i as f64 * step;
            let idx = (pos as usize).min(src_frames - 1);
            let next = (idx + 1).min(src_frames - 1);
            let frac = (pos - idx as f64) as f32;
            for ch in 0..2 {
                let a = self.samples[idx * 2 + ch];
                let b = self.samples[next * 2 + ch];
                samples.push(a + (b - a) * frac);
            }
        }
        Self {
            samples,
            sample_rate: target_rate,
        }
    }
}
