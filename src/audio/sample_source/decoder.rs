// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::error::SampleSourceError;

/// A live decode stream over an audio file (WAV, FLAC, MP3, OGG and anything
/// else symphonia can probe). Produces interleaved f32 samples.
pub struct FileDecoder {
    path: PathBuf,
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    frames: Option<u64>,
    /// Decoded samples not yet handed out.
    pending: Vec<f32>,
    pending_position: usize,
    /// Conversion buffer, reused across packets while the packet size allows.
    conversion: Option<InterleavedBuffer<f32>>,
    is_finished: bool,
}

impl FileDecoder {
    /// Opens the file at `path` and prepares its first audio track for decoding.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        let path = path.as_ref();
        let decode_error = |reason: String| SampleSourceError::Decode {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| decode_error(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| decode_error(e.to_string()))?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| decode_error("no audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| decode_error("sample rate not specified".to_string()))?;

        let decoder_opts: DecoderOptions = Default::default();
        let decoder = get_codecs()
            .make(&params, &decoder_opts)
            .map_err(|e| decode_error(e.to_string()))?;

        let mut source = FileDecoder {
            path: path.to_path_buf(),
            format_reader,
            decoder,
            track_id,
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
            sample_rate,
            frames: params.n_frames,
            pending: Vec::new(),
            pending_position: 0,
            conversion: None,
            is_finished: false,
        };

        // Some containers don't report a channel layout. Decode the first packet
        // and take the count from the decoded buffer; its samples stay pending.
        if source.channels == 0 {
            if !source.decode_next_packet()? || source.channels == 0 {
                return Err(decode_error("channels not specified".to_string()));
            }
            debug!(path = ?path, channels = source.channels, "Detected channel count");
        }

        Ok(source)
    }

    /// Reads up to `output.len()` interleaved samples. Keeps decoding packets
    /// until the output is full or the stream ends, so a short read means EOF.
    pub fn read(&mut self, output: &mut [f32]) -> Result<usize, SampleSourceError> {
        let mut written = 0;
        while written < output.len() {
            if self.pending_position >= self.pending.len() && !self.decode_next_packet()? {
                break;
            }
            let available = &self.pending[self.pending_position..];
            let to_copy = available.len().min(output.len() - written);
            output[written..written + to_copy].copy_from_slice(&available[..to_copy]);
            self.pending_position += to_copy;
            written += to_copy;
        }
        Ok(written)
    }

    /// Get the number of interleaved channels.
    pub fn channel_count(&self) -> u16 {
        self.channels
    }

    /// Get the native sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The number of frames the container claims, if it says.
    pub fn frames(&self) -> Option<u64> {
        self.frames
    }

    /// The file this decoder reads from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the stream has been fully consumed.
    pub fn is_finished(&self) -> bool {
        self.is_finished && self.pending_position >= self.pending.len()
    }

    /// Reads the next packet for our track. `Ok(None)` is end of stream.
    fn next_packet(&mut self) -> Result<Option<Packet>, SampleSourceError> {
        loop {
            match self.format_reader.next_packet() {
                Ok(packet) if packet.track_id() == self.track_id => return Ok(Some(packet)),
                Ok(_) => continue,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(SampleSourceError::AudioError(e)),
            }
        }
    }

    /// Decodes packets until one yields audio, replacing the pending buffer.
    /// Returns false at end of stream.
    fn decode_next_packet(&mut self) -> Result<bool, SampleSourceError> {
        if self.is_finished {
            return Ok(false);
        }

        loop {
            let packet = match self.next_packet()? {
                Some(packet) => packet,
                None => {
                    self.is_finished = true;
                    return Ok(false);
                }
            };

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // A corrupt packet is skipped, the rest of the stream may still be fine.
                Err(SymphoniaError::DecodeError(e)) => {
                    debug!(path = ?self.path, error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(SampleSourceError::AudioError(e)),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let capacity = decoded.capacity() as u64;
            let needed = decoded.capacity() * spec.channels.count();
            if self
                .conversion
                .as_ref()
                .is_some_and(|buffer| buffer.capacity() < needed)
            {
                self.conversion = None;
            }
            let conversion = self
                .conversion
                .get_or_insert_with(|| InterleavedBuffer::<f32>::new(capacity, spec));
            conversion.copy_interleaved_ref(decoded);

            if self.channels == 0 {
                self.channels = spec.channels.count() as u16;
            }

            self.pending.clear();
            self.pending.extend_from_slice(conversion.samples());
            self.pending_position = 0;
            return Ok(true);
        }
    }
}
