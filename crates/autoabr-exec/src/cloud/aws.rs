//! MediaConvert and ECS clients from the AWS SDK.
//!
//! Credentials and region follow the SDK's default provider chain. The encode
//! template is rendered as JSON and mapped onto the SDK's `JobSettings`; keys
//! outside the supported subset are logged and left out of the submission.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, ContainerOverride, LaunchType, NetworkConfiguration, Tag, TaskOverride,
};
use aws_sdk_mediaconvert::error::DisplayErrorContext;
use aws_sdk_mediaconvert::types as mc;
use serde_json::Value;
use tracing::{debug, warn};

use super::{AnalysisTask, BatchTranscoder, JobStatus, TaskLauncher, TranscodeRequest};
use crate::error::{ExecError, Result};

pub struct AwsServices {
    media_convert: aws_sdk_mediaconvert::Client,
    ecs: aws_sdk_ecs::Client,
}

impl AwsServices {
    /// Load the shared SDK config once and build both clients from it.
    pub async fn load(region: Option<&str>, media_convert_endpoint: &str) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;

        let mut media_convert = aws_sdk_mediaconvert::config::Builder::from(&sdk_config);
        if !media_convert_endpoint.is_empty() {
            media_convert = media_convert.endpoint_url(media_convert_endpoint);
        }
        Self {
            media_convert: aws_sdk_mediaconvert::Client::from_conf(media_convert.build()),
            ecs: aws_sdk_ecs::Client::new(&sdk_config),
        }
    }
}

fn service_error<E: std::error::Error>(e: E) -> ExecError {
    ExecError::JobService(DisplayErrorContext(e).to_string())
}

#[async_trait]
impl BatchTranscoder for AwsServices {
    async fn submit(&self, request: &TranscodeRequest) -> Result<String> {
        let mut call = self
            .media_convert
            .create_job()
            .role(&request.role)
            .settings(job_settings(&request.settings)?);
        if let Some(mode) = &request.acceleration_mode {
            let acceleration = mc::AccelerationSettings::builder()
                .mode(mc::AccelerationMode::from(mode.as_str()))
                .build()
                .map_err(service_error)?;
            call = call.acceleration_settings(acceleration);
        }
        let created = call.send().await.map_err(service_error)?;
        created
            .job()
            .and_then(|job| job.id())
            .map(str::to_string)
            .ok_or_else(|| ExecError::JobService("create-job returned no job id".into()))
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus> {
        let fetched = self.media_convert.get_job().id(job_id).send().await.map_err(service_error)?;
        let Some(job) = fetched.job() else {
            return Err(ExecError::JobService(format!("get-job returned no job for {job_id}")));
        };
        if let Some(message) = job.error_message() {
            debug!(job_id, error_message = message, "job reported an error message");
        }
        Ok(job
            .status()
            .map(|s| JobStatus::from_service(s.as_str()))
            .unwrap_or(JobStatus::Progressing))
    }
}

#[async_trait]
impl TaskLauncher for AwsServices {
    async fn launch(&self, task: &AnalysisTask) -> Result<()> {
        let vpc = AwsVpcConfiguration::builder()
            .subnets(&task.subnet)
            .security_groups(&task.security_group)
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()
            .map_err(service_error)?;
        let container = ContainerOverride::builder()
            .name(&task.container_name)
            .set_command(Some(task.command.clone()))
            .build();
        let tags = task
            .tags
            .iter()
            .map(|(key, value)| Tag::builder().key(key).value(value).build())
            .collect();

        let response = self
            .ecs
            .run_task()
            .cluster(&task.cluster)
            .task_definition(&task.task_definition)
            .launch_type(LaunchType::Fargate)
            .count(1)
            .network_configuration(NetworkConfiguration::builder().awsvpc_configuration(vpc).build())
            .overrides(TaskOverride::builder().container_overrides(container).build())
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(service_error)?;

        if let Some(failure) = response.failures().first() {
            return Err(ExecError::JobService(format!(
                "run-task failed for {}: {}",
                failure.arn().unwrap_or("task"),
                failure.reason().unwrap_or("unknown reason"),
            )));
        }
        if response.tasks().is_empty() {
            return Err(ExecError::JobService("run-task started no tasks".into()));
        }
        Ok(())
    }
}

/// Keys of `value` not in `known` are reported once per submission.
fn report_unsupported(value: &Value, known: &[&str], path: &str) {
    if let Value::Object(map) = value {
        for key in map.keys().filter(|k| !known.contains(&k.as_str())) {
            warn!(setting = %format!("{path}.{key}"), "MediaConvert setting not supported; left out");
        }
    }
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn array<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn number(value: &Value, key: &str) -> Result<Option<f64>> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ExecError::Template(format!("`{key}` must be numeric, got `{s}`"))),
        Some(other) => Err(ExecError::Template(format!("`{key}` must be numeric, got {other}"))),
    }
}

fn integer(value: &Value, key: &str) -> Result<Option<i32>> {
    match number(value, key)? {
        Some(n) if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) => Ok(Some(n as i32)),
        Some(n) => Err(ExecError::Template(format!("`{key}` must be a 32-bit integer, got {n}"))),
        None => Ok(None),
    }
}

/// Map rendered MediaConvert settings onto the SDK model.
pub fn job_settings(settings: &Value) -> Result<mc::JobSettings> {
    report_unsupported(settings, &["Inputs", "OutputGroups", "TimecodeConfig"], "Settings");
    let mut builder = mc::JobSettings::builder();
    for input in array(settings, "Inputs") {
        builder = builder.inputs(job_input(input));
    }
    for group in array(settings, "OutputGroups") {
        builder = builder.output_groups(output_group(group)?);
    }
    if let Some(timecode) = settings.get("TimecodeConfig") {
        builder = builder.timecode_config(
            mc::TimecodeConfig::builder()
                .set_source(text(timecode, "Source").map(mc::TimecodeSource::from))
                .build(),
        );
    }
    Ok(builder.build())
}

fn job_input(input: &Value) -> mc::Input {
    report_unsupported(
        input,
        &["FileInput", "TimecodeSource", "VideoSelector", "AudioSelectors"],
        "Inputs[]",
    );
    let mut builder = mc::Input::builder()
        .set_file_input(text(input, "FileInput").map(str::to_string))
        .set_timecode_source(text(input, "TimecodeSource").map(mc::InputTimecodeSource::from));
    if input.get("VideoSelector").is_some() {
        builder = builder.video_selector(mc::VideoSelector::builder().build());
    }
    if let Some(Value::Object(selectors)) = input.get("AudioSelectors") {
        for (name, selector) in selectors {
            builder = builder.audio_selectors(
                name,
                mc::AudioSelector::builder()
                    .set_default_selection(text(selector, "DefaultSelection").map(mc::AudioDefaultSelection::from))
                    .build(),
            );
        }
    }
    builder.build()
}

fn output_group(group: &Value) -> Result<mc::OutputGroup> {
    report_unsupported(group, &["Name", "OutputGroupSettings", "Outputs"], "OutputGroups[]");
    let mut builder = mc::OutputGroup::builder().set_name(text(group, "Name").map(str::to_string));
    if let Some(settings) = group.get("OutputGroupSettings") {
        let destination = settings
            .get("FileGroupSettings")
            .and_then(|f| text(f, "Destination"))
            .map(str::to_string);
        builder = builder.output_group_settings(
            mc::OutputGroupSettings::builder()
                .set_type(text(settings, "Type").map(mc::OutputGroupType::from))
                .file_group_settings(mc::FileGroupSettings::builder().set_destination(destination).build())
                .build(),
        );
    }
    for output in array(group, "Outputs") {
        builder = builder.outputs(job_output(output)?);
    }
    Ok(builder.build())
}

fn job_output(output: &Value) -> Result<mc::Output> {
    report_unsupported(
        output,
        &["NameModifier", "Extension", "ContainerSettings", "VideoDescription"],
        "Outputs[]",
    );
    let mut builder = mc::Output::builder()
        .set_name_modifier(text(output, "NameModifier").map(str::to_string))
        .set_extension(text(output, "Extension").map(str::to_string));
    if let Some(container) = output.get("ContainerSettings") {
        let mut settings = mc::ContainerSettings::builder().set_container(text(container, "Container").map(mc::ContainerType::from));
        if container.get("Mp4Settings").is_some() {
            settings = settings.mp4_settings(mc::Mp4Settings::builder().build());
        }
        builder = builder.container_settings(settings.build());
    }
    if let Some(video) = output.get("VideoDescription") {
        report_unsupported(video, &["Width", "Height", "CodecSettings"], "VideoDescription");
        let mut description = mc::VideoDescription::builder()
            .set_width(integer(video, "Width")?)
            .set_height(integer(video, "Height")?);
        if let Some(codec) = video.get("CodecSettings") {
            description = description.codec_settings(codec_settings(codec)?);
        }
        builder = builder.video_description(description.build());
    }
    Ok(builder.build())
}

const CODEC_KEYS: &[&str] = &[
    "Bitrate",
    "MaxBitrate",
    "HrdBufferSize",
    "RateControlMode",
    "CodecProfile",
    "QualityTuningLevel",
    "GopSize",
    "GopSizeUnits",
    "GopBReference",
    "AdaptiveQuantization",
    "NumberBFramesBetweenReferenceFrames",
];

fn codec_settings(codec: &Value) -> Result<mc::VideoCodecSettings> {
    report_unsupported(codec, &["Codec", "H264Settings", "H265Settings"], "CodecSettings");
    let mut builder = mc::VideoCodecSettings::builder().set_codec(text(codec, "Codec").map(mc::VideoCodec::from));
    if let Some(h264) = codec.get("H264Settings") {
        report_unsupported(h264, CODEC_KEYS, "H264Settings");
        builder = builder.h264_settings(
            mc::H264Settings::builder()
                .set_bitrate(integer(h264, "Bitrate")?)
                .set_max_bitrate(integer(h264, "MaxBitrate")?)
                .set_hrd_buffer_size(integer(h264, "HrdBufferSize")?)
                .set_rate_control_mode(text(h264, "RateControlMode").map(mc::H264RateControlMode::from))
                .set_codec_profile(text(h264, "CodecProfile").map(mc::H264CodecProfile::from))
                .set_quality_tuning_level(text(h264, "QualityTuningLevel").map(mc::H264QualityTuningLevel::from))
                .set_gop_size(number(h264, "GopSize")?)
                .set_gop_size_units(text(h264, "GopSizeUnits").map(mc::H264GopSizeUnits::from))
                .set_gop_b_reference(text(h264, "GopBReference").map(mc::H264GopBReference::from))
                .set_adaptive_quantization(text(h264, "AdaptiveQuantization").map(mc::H264AdaptiveQuantization::from))
                .set_number_b_frames_between_reference_frames(integer(h264, "NumberBFramesBetweenReferenceFrames")?)
                .build(),
        );
    }
    if let Some(h265) = codec.get("H265Settings") {
        report_unsupported(h265, CODEC_KEYS, "H265Settings");
        builder = builder.h265_settings(
            mc::H265Settings::builder()
                .set_bitrate(integer(h265, "Bitrate")?)
                .set_max_bitrate(integer(h265, "MaxBitrate")?)
                .set_hrd_buffer_size(integer(h265, "HrdBufferSize")?)
                .set_rate_control_mode(text(h265, "RateControlMode").map(mc::H265RateControlMode::from))
                .set_codec_profile(text(h265, "CodecProfile").map(mc::H265CodecProfile::from))
                .set_quality_tuning_level(text(h265, "QualityTuningLevel").map(mc::H265QualityTuningLevel::from))
                .set_gop_size(number(h265, "GopSize")?)
                .set_gop_size_units(text(h265, "GopSizeUnits").map(mc::H265GopSizeUnits::from))
                .set_gop_b_reference(text(h265, "GopBReference").map(mc::H265GopBReference::from))
                .set_adaptive_quantization(text(h265, "AdaptiveQuantization").map(mc::H265AdaptiveQuantization::from))
                .set_number_b_frames_between_reference_frames(integer(h265, "NumberBFramesBetweenReferenceFrames")?)
                .build(),
        );
    }
    Ok(builder.build())
}
