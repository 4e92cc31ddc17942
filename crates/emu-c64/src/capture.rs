//! Headless capture: PNG screenshots and WAV audio dumps.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::palette::frame_to_rgb;

/// Encode an ARGB32 frame as an 8-bit RGB PNG.
pub fn write_png<W: Write>(
    out: W,
    width: u32,
    height: u32,
    frame: &[u32],
) -> Result<(), png::EncodingError> {
    let mut encoder = png::Encoder::new(out, width, height);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame_to_rgb(frame))?;
    writer.finish()
}

/// Save an ARGB32 frame to a PNG file.
pub fn save_png(path: &Path, width: u32, height: u32, frame: &[u32]) -> Result<(), png::EncodingError> {
    let file = File::create(path)?;
    write_png(BufWriter::new(file), width, height, frame)
}

/// Streams SID output into a mono 16-bit WAV file.
pub struct WavRecorder {
    writer: hound::WavWriter<BufWriter<File>>,
    samples: u64,
}

impl WavRecorder {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Ok(Self {
            writer: hound::WavWriter::create(path, spec)?,
            samples: 0,
        })
    }

    pub fn push(&mut self, samples: &[i16]) -> Result<(), hound::Error> {
        for &sample in samples {
            self.writer.write_sample(sample)?;
        }
        self.samples += samples.len() as u64;
        Ok(())
    }

    #[must_use]
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Patch the header lengths and close the file.
    pub fn finalize(self) -> Result<(), hound::Error> {
        self.writer.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PALETTE;

    #[test]
    fn png_round_trip_dimensions() {
        let frame = vec![PALETTE[6]; 4 * 3];
        let mut bytes = Vec::new();
        write_png(&mut bytes, 4, 3, &frame).expect("encode");

        let decoder = png::Decoder::new(bytes.as_slice());
        let mut reader = decoder.read_info().expect("header");
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).expect("frame");
        assert_eq!((info.width, info.height), (4, 3));
        assert_eq!(&buf[..3], &[0x40, 0x31, 0x8D]);
    }

    #[test]
    fn wav_holds_pushed_samples() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");
        let mut wav = WavRecorder::create(&path, 48_000).expect("create");
        wav.push(&[0, 100, -100]).expect("write");
        assert_eq!(wav.samples(), 3);
        wav.finalize().expect("finalize");

        let reader = hound::WavReader::open(&path).expect("open");
        assert_eq!(reader.spec().sample_rate, 48_000);
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .map(|s| s.expect("sample"))
            .collect();
        assert_eq!(samples, vec![0, 100, -100]);
    }
}
