//! GStreamer-based H.264 hardware encoder.
//!
//! Hardware encoding is mandatory for usable performance on headset
//! hardware; there is no software fallback.
//!
//! Platform support:
//! - Android/Linux: AMC/VAAPI (Intel/AMD), NVENC (Nvidia)
//! - macOS: VideoToolbox
//! - Windows: NVENC, AMF, QuickSync, MediaFoundation

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use vrlobby_media::{CodecError, EncodedFrame, VideoEncoder, VideoFrame};

/// Detect which hardware H.264 encoder is available on this system.
fn detect_hw_encoder() -> Result<&'static str, CodecError> {
    gst::init().map_err(|e| CodecError::Unavailable(e.to_string()))?;

    #[cfg(target_os = "macos")]
    let encoders = [("vtenc_h264_hw", "VideoToolbox H.264 (hardware only)"), ("vtenc_h264", "VideoToolbox H.264")];

    #[cfg(target_os = "linux")]
    let encoders = [
        ("amcvidenc-omxqcomvideoencoderavc", "Android MediaCodec H.264"),
        ("nvh264enc", "NVIDIA NVENC H.264"),
        ("vaapih264enc", "VAAPI H.264 (Intel/AMD)"),
    ];

    #[cfg(target_os = "windows")]
    let encoders = [
        ("nvh264enc", "NVIDIA NVENC H.264"),
        ("amfh264enc", "AMD AMF H.264"),
        ("qsvh264enc", "Intel QuickSync H.264"),
        ("mfh264enc", "MediaFoundation H.264"),
    ];

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    let encoders: [(&str, &str); 0] = [];

    for (element_name, description) in &encoders {
        if gst::ElementFactory::find(element_name).is_some() {
            tracing::info!("Found hardware encoder: {} ({})", description, element_name);
            return Ok(*element_name);
        }
    }

    Err(CodecError::Unavailable(
        "no hardware H.264 encoder found; install the platform GStreamer codec plugins".into(),
    ))
}

/// Encoder-specific pipeline segment. `h264parse config-interval=-1` inserts
/// SPS/PPS before every IDR so a viewer joining mid-stream can start
/// decoding; byte-stream/au alignment matches what the sample track expects.
fn build_encoder_segment(encoder: &str, bitrate: u32) -> String {
    let kbps = bitrate / 1000;
    let encoder_part = match encoder {
        "vtenc_h264_hw" | "vtenc_h264" => format!(
            "{encoder} name=encoder allow-frame-reordering=false max-keyframe-interval=30 bitrate={kbps}"
        ),
        "nvh264enc" => format!(
            "nvh264enc name=encoder preset=low-latency-hq rc-mode=cbr bitrate={kbps} zerolatency=true"
        ),
        "vaapih264enc" => format!(
            "vaapih264enc name=encoder rate-control=cbr bitrate={kbps} keyframe-period=60"
        ),
        "amfh264enc" => format!("amfh264enc name=encoder bitrate={kbps} rate-control=cbr"),
        "qsvh264enc" => format!("qsvh264enc name=encoder bitrate={kbps} rate-control=cbr low-latency=true"),
        "mfh264enc" => format!("mfh264enc name=encoder bitrate={bitrate}"),
        _ => format!("{encoder} name=encoder bitrate={kbps}"),
    };
    format!(
        "{encoder_part} ! h264parse config-interval=-1 ! video/x-h264,stream-format=byte-stream,alignment=au"
    )
}

/// H.264 hardware encoder behind the [`VideoEncoder`] seam.
pub struct GstH264Encoder {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    encoder: gst::Element,
    width: u32,
    height: u32,
}

impl GstH264Encoder {
    pub fn new(width: u32, height: u32, fps: u32) -> Result<Self, CodecError> {
        let encoder = detect_hw_encoder()?;
        let bitrate = Self::calculate_bitrate(width, height, fps);
        let encoder_segment = build_encoder_segment(encoder, bitrate);

        // appsrc -> videoconvert -> hw encoder -> h264parse -> appsink
        let pipeline_str = format!(
            "appsrc name=src format=time is-live=true do-timestamp=true \
             caps=video/x-raw,format=RGB,width={width},height={height},framerate={fps}/1 ! \
             videoconvert ! video/x-raw,format=I420 ! \
             {encoder_segment} ! \
             appsink name=sink sync=false max-buffers=2 drop=true"
        );

        tracing::info!(
            "Creating H.264 hardware encoder ({}) for {}x{} @{}fps, {}kbps",
            encoder,
            width,
            height,
            fps,
            bitrate / 1000
        );

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| CodecError::Unavailable(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| CodecError::Unavailable("failed to downcast to Pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| CodecError::Unavailable("could not find appsrc".into()))?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| CodecError::Unavailable("failed to downcast to AppSrc".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CodecError::Unavailable("could not find appsink".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| CodecError::Unavailable("failed to downcast to AppSink".into()))?;

        appsink.set_property("sync", false);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| CodecError::Unavailable(e.to_string()))?;

        // Surface immediate pipeline failures (missing plugin, bad caps)
        if let Some(bus) = pipeline.bus() {
            while let Some(msg) = bus.pop() {
                use gst::MessageView;
                if let MessageView::Error(err) = msg.view() {
                    let _ = pipeline.set_state(gst::State::Null);
                    return Err(CodecError::Unavailable(format!(
                        "hardware encoder ({}) failed: {}",
                        encoder,
                        err.error()
                    )));
                }
            }
        }

        let encoder_element = pipeline
            .by_name("encoder")
            .ok_or_else(|| CodecError::Unavailable("encoder element missing from pipeline".into()))?;

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            encoder: encoder_element,
            width,
            height,
        })
    }

    fn calculate_bitrate(width: u32, height: u32, fps: u32) -> u32 {
        let pixels = width * height;
        let fps_factor = fps as f64 / 30.0;
        let base_bitrate = if pixels >= 1920 * 1080 {
            3_000_000
        } else if pixels >= 1280 * 720 {
            1_500_000
        } else {
            1_000_000
        };
        (base_bitrate as f64 * fps_factor) as u32
    }

    fn stop(&mut self) {
        let _ = self.appsrc.end_of_stream();
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

impl VideoEncoder for GstH264Encoder {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn encode(&mut self, frame: &VideoFrame) -> Result<EncodedFrame, CodecError> {
        if frame.width != self.width || frame.height != self.height {
            return Err(CodecError::BadFrame(format!(
                "expected {}x{}, got {}x{}",
                self.width, self.height, frame.width, frame.height
            )));
        }
        let expected_size = (self.width * self.height * 3) as usize;
        if frame.data.len() != expected_size {
            return Err(CodecError::BadFrame(format!(
                "expected {} bytes, got {}",
                expected_size,
                frame.data.len()
            )));
        }

        let mut buffer = gst::Buffer::with_size(frame.data.len())
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        {
            let buffer_ref = buffer
                .get_mut()
                .ok_or_else(|| CodecError::Encode("failed to get buffer mut".into()))?;
            let mut map = buffer_ref
                .map_writable()
                .map_err(|e| CodecError::Encode(e.to_string()))?;
            map.copy_from_slice(&frame.data);
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| CodecError::Encode(e.to_string()))?;

        match self.appsink.try_pull_sample(gst::ClockTime::from_mseconds(50)) {
            Some(sample) => {
                let buffer = sample
                    .buffer()
                    .ok_or_else(|| CodecError::Encode("no buffer in sample".into()))?;
                let keyframe = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);
                let map = buffer
                    .map_readable()
                    .map_err(|e| CodecError::Encode(e.to_string()))?;
                Ok(EncodedFrame {
                    data: map.as_slice().to_vec(),
                    keyframe,
                })
            }
            None => {
                tracing::debug!("H.264 encoder buffering");
                Ok(EncodedFrame {
                    data: vec![],
                    keyframe: false,
                })
            }
        }
    }

    fn force_keyframe(&mut self) {
        use gst::event::CustomDownstream;

        let structure = gst::Structure::builder("GstForceKeyUnit")
            .field("all-headers", true)
            .build();
        let event = CustomDownstream::new(structure);

        if let Some(sink_pad) = self.encoder.static_pad("sink") {
            if sink_pad.send_event(event) {
                tracing::debug!("sent force-keyframe request to encoder");
                return;
            }
        }
        tracing::warn!("failed to send force-keyframe event to encoder");
    }
}

impl Drop for GstH264Encoder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_encoder_detection_reports_availability() {
        match detect_hw_encoder() {
            Ok(encoder) => println!("Found hardware encoder: {}", encoder),
            Err(e) => println!("No hardware encoder: {}", e),
        }
    }

    #[test]
    fn bitrate_scales_with_resolution() {
        assert!(
            GstH264Encoder::calculate_bitrate(1920, 1080, 30)
                > GstH264Encoder::calculate_bitrate(960, 540, 30)
        );
        assert_eq!(GstH264Encoder::calculate_bitrate(960, 540, 30), 1_000_000);
    }
}
