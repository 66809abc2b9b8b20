use serde::Deserialize;
use tracing::debug;

use crate::error::{ModerationError, ModerationResult};

/// Decoded PCM channel count (interleaved)
pub const CHANNELS: usize = 2;
/// Samples per channel in one 20 ms frame
pub const FRAME_SIZE: usize = 960;
/// Bytes in one interleaved stereo i16 sample frame
const SAMPLE_FRAME_BYTES: usize = CHANNELS * 2;

/// Encoding of the frames a voice source delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Opus packets (requires the `opus` feature)
    Opus,
    /// Already-decoded stereo 16-bit little-endian PCM
    Pcm,
}

impl Codec {
    /// Build a fresh decoder for one stream
    pub fn decoder(self) -> ModerationResult<Box<dyn FrameDecoder>> {
        match self {
            Codec::Pcm => Ok(Box::new(PcmDecoder)),

            Codec::Opus => {
                #[cfg(feature = "opus")]
                {
                    Ok(Box::new(opus::OpusDecoder::new()?))
                }

                #[cfg(not(feature = "opus"))]
                {
                    Err(ModerationError::Codec(
                        "opus decoding requires the `opus` feature".to_string(),
                    ))
                }
            }
        }
    }
}

/// Turns encoded frames into stereo 16-bit little-endian PCM chunks
pub trait FrameDecoder: Send {
    fn decode(&mut self, frame: &[u8]) -> ModerationResult<Vec<u8>>;

    /// Decoder name for logging
    fn name(&self) -> &str;
}

/// Passthrough for sources that already deliver PCM
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmDecoder;

impl FrameDecoder for PcmDecoder {
    fn decode(&mut self, frame: &[u8]) -> ModerationResult<Vec<u8>> {
        if frame.len() % SAMPLE_FRAME_BYTES != 0 {
            return Err(ModerationError::DecodeFailure(format!(
                "PCM frame of {} bytes is not aligned to {}-byte stereo samples",
                frame.len(),
                SAMPLE_FRAME_BYTES
            )));
        }
        debug!("Passing through PCM frame ({} bytes)", frame.len());
        Ok(frame.to_vec())
    }

    fn name(&self) -> &str {
        "pcm"
    }
}

#[cfg(feature = "opus")]
mod opus {
    use audiopus::{coder::Decoder, Channels, SampleRate};
    use tracing::debug;

    use super::{FrameDecoder, CHANNELS, FRAME_SIZE};
    use crate::error::{ModerationError, ModerationResult};

    /// Opus decoder at 48 kHz stereo
    pub struct OpusDecoder {
        decoder: Decoder,
    }

    impl OpusDecoder {
        pub fn new() -> ModerationResult<Self> {
            let decoder = Decoder::new(SampleRate::Hz48000, Channels::Stereo)
                .map_err(|e| ModerationError::Codec(e.to_string()))?;

            debug!("Opus decoder created: 48kHz stereo, frame_size={}", FRAME_SIZE);

            Ok(Self { decoder })
        }
    }

    impl FrameDecoder for OpusDecoder {
        fn decode(&mut self, frame: &[u8]) -> ModerationResult<Vec<u8>> {
            let mut output = vec![0i16; FRAME_SIZE * CHANNELS];
            let decoded = self
                .decoder
                .decode(Some(frame), &mut output, false)
                .map_err(|e| ModerationError::DecodeFailure(e.to_string()))?;

            output.truncate(decoded * CHANNELS);
            Ok(output.iter().flat_map(|s| s.to_le_bytes()).collect())
        }

        fn name(&self) -> &str {
            "opus"
        }
    }
}
