//! WAV container encoding and WAV file sources.

use crate::audio::frame::{AudioFormat, samples_to_pcm};
use crate::error::{ParleyError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Size of the canonical PCM WAV header written by [`encode`].
pub const HEADER_LEN: usize = 44;

const PCM_FORMAT_TAG: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Wraps raw PCM in a canonical 44-byte little-endian RIFF/WAVE header.
///
/// The payload is copied verbatim after the header. Sizes larger than a RIFF
/// container can describe saturate at `u32::MAX`, and a block alignment too
/// wide for its field saturates at `u16::MAX`.
pub fn encode(pcm: &[u8], format: AudioFormat) -> Vec<u8> {
    let data_size = u32::try_from(pcm.len()).unwrap_or(u32::MAX);
    let block_align = u16::try_from(format.block_align()).unwrap_or(u16::MAX);

    let mut out = Vec::with_capacity(HEADER_LEN + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&data_size.saturating_add(36).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    out.extend_from_slice(&PCM_FORMAT_TAG.to_le_bytes());
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.extend_from_slice(&format.byte_rate().to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&format.bits_per_sample.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

/// PCM payload and format recovered from a WAV container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedWav {
    pub format: AudioFormat,
    pub pcm: Vec<u8>,
}

/// Parses a PCM WAV container back into its format and payload.
///
/// Unknown chunks between `fmt ` and `data` are skipped.
///
/// Parsed by hand rather than with `hound`: hound rejects payloads that end
/// mid-sample, and [`encode`] must round-trip any byte sequence.
pub fn decode(bytes: &[u8]) -> Result<DecodedWav> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(ParleyError::WavDecode {
            message: "missing RIFF/WAVE header".to_string(),
        });
    }

    let mut format = None;
    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = &bytes[offset..offset + 4];
        let size = read_u32(bytes, offset + 4) as usize;
        let body_start = offset + 8;

        match id {
            b"fmt " => {
                if size < FMT_CHUNK_LEN as usize || body_start + size > bytes.len() {
                    return Err(ParleyError::WavDecode {
                        message: format!("truncated fmt chunk ({size} bytes)"),
                    });
                }
                let tag = read_u16(bytes, body_start);
                if tag != PCM_FORMAT_TAG {
                    return Err(ParleyError::WavDecode {
                        message: format!("unsupported format tag {tag}"),
                    });
                }
                format = Some(AudioFormat {
                    channels: read_u16(bytes, body_start + 2),
                    sample_rate: read_u32(bytes, body_start + 4),
                    bits_per_sample: read_u16(bytes, body_start + 14),
                });
            }
            b"data" => {
                let Some(format) = format else {
                    return Err(ParleyError::WavDecode {
                        message: "data chunk before fmt chunk".to_string(),
                    });
                };
                let end = body_start
                    .checked_add(size)
                    .filter(|end| *end <= bytes.len())
                    .ok_or_else(|| ParleyError::WavDecode {
                        message: format!(
                            "data chunk claims {size} bytes, {} available",
                            bytes.len() - body_start
                        ),
                    })?;
                return Ok(DecodedWav {
                    format,
                    pcm: bytes[body_start..end].to_vec(),
                });
            }
            _ => {}
        }

        // RIFF chunks are word aligned
        offset = body_start.saturating_add(size + (size & 1));
    }

    Err(ParleyError::WavDecode {
        message: "no data chunk".to_string(),
    })
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Recorded audio loaded from a WAV file, normalized to 16-bit mono at the
/// pipeline sample rate.
pub struct WavFileSource {
    samples: Vec<i16>,
    format: AudioFormat,
}

impl WavFileSource {
    /// Opens a WAV file from disk.
    pub fn open(path: &Path, sample_rate: u32) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(Box::new(BufReader::new(file)), sample_rate)
    }

    /// Create from any reader. Supports arbitrary sample rates and channel counts.
    pub fn from_reader(reader: Box<dyn Read + Send>, sample_rate: u32) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| ParleyError::WavDecode {
            message: format!("Failed to parse WAV file: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
            return Err(ParleyError::AudioFormat {
                message: format!(
                    "expected 16-bit integer PCM, got {}-bit {:?}",
                    spec.bits_per_sample, spec.sample_format
                ),
            });
        }

        let raw_samples: Vec<i16> = wav_reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ParleyError::WavDecode {
                message: format!("Failed to read WAV samples: {}", e),
            })?;

        let mono_samples = downmix(raw_samples, spec.channels);
        let samples = resample(&mono_samples, spec.sample_rate, sample_rate);

        Ok(Self {
            samples,
            format: AudioFormat::mono16(sample_rate),
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn duration(&self) -> std::time::Duration {
        self.format.duration_of(self.samples.len() * 2)
    }

    /// Splits the recording into PCM byte slices of `slice_ms` milliseconds.
    /// The last slice may be shorter.
    pub fn into_slices(self, slice_ms: u32) -> Vec<Vec<u8>> {
        let per_slice = ((u64::from(self.format.sample_rate) * u64::from(slice_ms) / 1000) as usize)
            .max(1);
        self.samples
            .chunks(per_slice)
            .map(samples_to_pcm)
            .collect()
    }
}

/// Averages interleaved channels into one.
fn downmix(samples: Vec<i16>, channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples;
    }
    let channels = usize::from(channels);
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn make_wav_data(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        cursor.into_inner()
    }

    #[test]
    fn header_is_44_bytes_with_expected_fields() {
        let pcm = vec![0u8; 320];
        let wav = encode(&pcm, AudioFormat::mono16(16000));

        assert_eq!(wav.len(), HEADER_LEN + 320);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(read_u32(&wav, 4), 36 + 320);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(read_u32(&wav, 16), 16);
        assert_eq!(read_u16(&wav, 20), 1);
        assert_eq!(read_u16(&wav, 22), 1);
        assert_eq!(read_u32(&wav, 24), 16000);
        assert_eq!(read_u32(&wav, 28), 32000);
        assert_eq!(read_u16(&wav, 32), 2);
        assert_eq!(read_u16(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(read_u32(&wav, 40), 320);
    }

    #[test]
    fn oversized_block_align_saturates() {
        let format = AudioFormat {
            sample_rate: 48000,
            bits_per_sample: 128,
            channels: 8192,
        };
        let wav = encode(&[0u8; 4], format);

        assert_eq!(read_u16(&wav, 32), u16::MAX);
        assert_eq!(read_u32(&wav, 28), u32::MAX);
        assert_eq!(&wav[HEADER_LEN..], &[0u8; 4]);
    }

    #[test]
    fn decode_keeps_a_payload_that_ends_mid_sample() {
        let pcm = vec![1u8, 2, 3];
        let decoded = decode(&encode(&pcm, AudioFormat::mono16(16000))).unwrap();
        assert_eq!(decoded.pcm, pcm);
    }

    #[test]
    fn payload_is_copied_verbatim() {
        let pcm: Vec<u8> = (0..=255).collect();
        let wav = encode(&pcm, AudioFormat::mono16(8000));
        assert_eq!(&wav[HEADER_LEN..], pcm.as_slice());
    }

    #[test]
    fn empty_payload_still_has_header() {
        let wav = encode(&[], AudioFormat::mono16(16000));
        assert_eq!(wav.len(), HEADER_LEN);
        assert_eq!(read_u32(&wav, 4), 36);
        assert_eq!(read_u32(&wav, 40), 0);
    }

    #[test]
    fn encode_is_deterministic() {
        let pcm = vec![7u8; 100];
        let format = AudioFormat::mono16(16000);
        assert_eq!(encode(&pcm, format), encode(&pcm, format));
    }

    #[test]
    fn hound_reads_encoded_output() {
        let samples = vec![0i16, 1000, -1000, i16::MAX, i16::MIN];
        let wav = encode(&samples_to_pcm(&samples), AudioFormat::mono16(16000));

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16000);
        assert_eq!(spec.bits_per_sample, 16);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn decode_recovers_payload_and_format() {
        let cases = [
            (AudioFormat::mono16(16000), vec![1u8, 2, 3, 4]),
            (
                AudioFormat {
                    sample_rate: 44100,
                    bits_per_sample: 8,
                    channels: 2,
                },
                vec![9u8; 17],
            ),
            (
                AudioFormat {
                    sample_rate: 48000,
                    bits_per_sample: 24,
                    channels: 1,
                },
                Vec::new(),
            ),
        ];

        for (format, pcm) in cases {
            let decoded = decode(&encode(&pcm, format)).unwrap();
            assert_eq!(decoded.format, format);
            assert_eq!(decoded.pcm, pcm);
        }
    }

    #[test]
    fn decode_reads_hound_written_files() {
        let samples = vec![10i16, 20, 30];
        let decoded = decode(&make_wav_data(22050, 1, &samples)).unwrap();
        assert_eq!(decoded.format, AudioFormat::mono16(22050));
        assert_eq!(decoded.pcm, samples_to_pcm(&samples));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"").is_err());
        assert!(decode(b"XXXX\x00\x00\x00\x00WAVEfmt ").is_err());
        assert!(decode(&[0u8; 100]).is_err());
    }

    #[test]
    fn decode_rejects_truncated_data_chunk() {
        let mut wav = encode(&[0u8; 10], AudioFormat::mono16(16000));
        wav.truncate(wav.len() - 4);
        match decode(&wav) {
            Err(ParleyError::WavDecode { message }) => assert!(message.contains("claims")),
            other => panic!("expected WavDecode, got {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_missing_fmt() {
        let no_fmt = b"RIFF\x24\x00\x00\x00WAVEdata\x02\x00\x00\x00\x00\x00";
        assert!(decode(no_fmt).is_err());
    }

    #[test]
    fn file_source_16khz_mono_matches_exactly() {
        let input = vec![100i16, 200, 300, 400, 500];
        let wav_data = make_wav_data(16000, 1, &input);

        let source = WavFileSource::from_reader(Box::new(Cursor::new(wav_data)), 16000).unwrap();

        assert_eq!(source.samples, input);
        assert_eq!(source.format(), AudioFormat::mono16(16000));
    }

    #[test]
    fn file_source_downmixes_stereo() {
        let stereo = vec![100i16, 200, 300, 400, -100, 100];
        let wav_data = make_wav_data(16000, 2, &stereo);

        let source = WavFileSource::from_reader(Box::new(Cursor::new(wav_data)), 16000).unwrap();

        assert_eq!(source.samples, vec![150i16, 350, 0]);
    }

    #[test]
    fn file_source_resamples_to_pipeline_rate() {
        let input = vec![1000i16; 48000];
        let wav_data = make_wav_data(48000, 1, &input);

        let source = WavFileSource::from_reader(Box::new(Cursor::new(wav_data)), 16000).unwrap();

        assert!(source.samples.len() >= 15900 && source.samples.len() <= 16100);
        assert!(source.samples.iter().all(|&s| (900..=1100).contains(&s)));
    }

    #[test]
    fn file_source_rejects_invalid_data() {
        let result = WavFileSource::from_reader(Box::new(Cursor::new(vec![0u8, 1, 2, 3])), 16000);
        match result {
            Err(ParleyError::WavDecode { message }) => {
                assert!(message.contains("Failed to parse WAV file"))
            }
            _ => panic!("Expected WavDecode error"),
        }
    }

    #[test]
    fn file_source_slices_into_fixed_durations() {
        let input = vec![1i16; 5000];
        let wav_data = make_wav_data(16000, 1, &input);
        let source = WavFileSource::from_reader(Box::new(Cursor::new(wav_data)), 16000).unwrap();

        let slices = source.into_slices(100);

        // 1600 samples per 100ms slice: 3 full slices and a 200-sample tail
        assert_eq!(slices.len(), 4);
        assert_eq!(slices[0].len(), 3200);
        assert_eq!(slices[3].len(), 400);
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![100i16, 200, 300];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_upsample_interpolates() {
        let resampled = resample(&[0i16, 1000, 2000], 8000, 16000);
        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0);
        assert!(resampled[1] > 0 && resampled[1] < 1000);
        assert_eq!(resampled[2], 1000);
    }

    #[test]
    fn resample_handles_empty_and_single() {
        assert!(resample(&[], 16000, 8000).is_empty());
        assert_eq!(resample(&[100i16], 16000, 8000), vec![100]);
    }
}
