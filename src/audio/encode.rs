#![allow(clippy::cast_possible_truncation)]

use std::io::Cursor;

use anyhow::{Context, Result};

use super::buffer::AudioBuffer;

/// ミックス済みバッファを 16bit ステレオ WAV にエンコードする。
///
/// オーバーレイ合成でフルスケールを超えたサンプルはここで [-1.0, 1.0] に
/// クランプされる。
///
/// # Errors
/// WAV ヘッダまたはサンプルの書き込みに失敗した場合はエラーを返す。
pub fn encode_wav(buffer: &AudioBuffer) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("failed to start WAV stream")?;
        for &sample in buffer.samples() {
            let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
            writer
                .write_sample(quantized)
                .context("failed to write WAV sample")?;
        }
        writer.finalize().context("failed to finalize WAV stream")?;
    }

    Ok(cursor.into_inner())
}
