#![allow(clippy::cast_precision_loss)]

use std::io::Cursor;

use anyhow::{Context, Result, anyhow, bail};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::buffer::AudioBuffer;

/// エンコード済みバイト列をデコードして [`AudioBuffer`] を返す。
///
/// 入力はメモリ上で処理され、一時ファイルは作らない。`extension_hint` は
/// コンテナ推定のヒント（`"mp3"` など）で、省略可能。
///
/// # Errors
/// コンテナの認識、コーデックの初期化、パケットのデコードに失敗した場合は
/// エラーを返す。
pub fn decode_audio(bytes: Vec<u8>, extension_hint: Option<&str>) -> Result<AudioBuffer> {
    let source = MediaSourceStream::new(
        Box::new(Cursor::new(bytes)),
        MediaSourceStreamOptions::default(),
    );

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unrecognized audio container")?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no audio track found"))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params.sample_rate.unwrap_or(44_100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("unsupported audio codec")?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context("failed to read audio packet"));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = decoder
            .decode(&packet)
            .context("failed to decode audio packet")?;
        extend_stereo_f32(&mut samples, &decoded)?;
    }

    AudioBuffer::new(samples, sample_rate)
}

fn extend_stereo_f32(dst: &mut Vec<f32>, decoded: &AudioBufferRef<'_>) -> Result<()> {
    match decoded {
        AudioBufferRef::F32(buf) => extend_frames(dst, buf, |s| s),
        AudioBufferRef::S16(buf) => extend_frames(dst, buf, |s| f32::from(s) / 32_768.0),
        AudioBufferRef::S32(buf) => extend_frames(dst, buf, |s| s as f32 / 2_147_483_648.0),
        AudioBufferRef::F64(buf) => extend_frames(dst, buf, |s| s as f32),
        _ => bail!("unsupported sample format"),
    }
    Ok(())
}

fn extend_frames<S>(
    dst: &mut Vec<f32>,
    buf: &symphonia::core::audio::AudioBuffer<S>,
    convert: impl Fn(S) -> f32,
) where
    S: symphonia::core::sample::Sample + Copy,
{
    let channels = buf.spec().channels.count();
    let frames = buf.frames();
    match channels {
        0 => {}
        1 => {
            // Mono: duplicate into both channels.
            for &sample in buf.chan(0) {
                let value = convert(sample);
                dst.push(value);
                dst.push(value);
            }
        }
        2 => {
            let left = buf.chan(0);
            let right = buf.chan(1);
            for i in 0..frames {
                dst.push(convert(left[i]));
                dst.push(convert(right[i]));
            }
        }
        _ => {
            // Multi-channel: average alternating channels into a stereo downmix.
            let halves = channels as f32 / 2.0;
            for frame in 0..frames {
                let mut left_sum = 0.0_f32;
                let mut right_sum = 0.0_f32;
                for ch in 0..channels {
                    let value = convert(buf.chan(ch)[frame]);
                    if ch % 2 == 0 {
                        left_sum += value;
                    } else {
                        right_sum += value;
                    }
                }
                dst.push(left_sum / halves);
                dst.push(right_sum / halves);
            }
        }
    }
}
