use sendspin_player::audio::output::{AudioOutput, CpalOutput};
use sendspin_player::audio::StreamFormat;

fn pcm_stereo_48k() -> StreamFormat {
    StreamFormat {
        codec: "pcm".to_string(),
        sample_rate: 48_000,
        channels: 2,
        bit_depth: 16,
        codec_header: None,
    }
}

#[test]
fn test_audio_output_creation() {
    // CpalOutput::new() should succeed on machines with an output device
    let output = CpalOutput::new(&pcm_stereo_48k());
    if let Err(err) = output {
        eprintln!("Skipping test_audio_output_creation: {}", err);
        return;
    }
    assert!(output.is_ok());
}

#[test]
fn test_audio_output_write() {
    let mut output = match CpalOutput::new(&pcm_stereo_48k()) {
        Ok(output) => output,
        Err(err) => {
            eprintln!("Skipping test_audio_output_write: {}", err);
            return;
        }
    };

    // 10ms of 16-bit stereo silence at 48kHz
    let silence = vec![0u8; 960 * 4];
    let result = output.write(&silence);
    if let Err(err) = result {
        eprintln!("Skipping test_audio_output_write: {}", err);
        return;
    }
    assert!(result.is_ok());
    output.stop();
}

#[test]
fn test_unsupported_formats_rejected() {
    // Rejected before any device is touched, so these run everywhere.
    let mut format = pcm_stereo_48k();
    format.bit_depth = 24;
    assert!(CpalOutput::new(&format).is_err());

    let mut format = pcm_stereo_48k();
    format.codec = "opus".to_string();
    assert!(CpalOutput::new(&format).is_err());

    let mut format = pcm_stereo_48k();
    format.channels = 0;
    assert!(CpalOutput::new(&format).is_err());
}
