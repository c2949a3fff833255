use chrono::Utc;
use ipcpipe_frame::{encode_envelope, DynamicEnvelope, Envelope, Value};
use ipcpipe_pipeline::PipeAccess;
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{frame_error, pipeline_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_send, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let envelope = resolve_envelope(&args)?;
    let frame_size = encode_envelope(&envelope)
        .map_err(|err| frame_error("encode failed", err))?
        .len();

    let pipe = args
        .target
        .builder(PipeAccess::WRITE)
        .build()
        .map_err(|err| pipeline_error("open failed", err))?;
    let response = pipe
        .send(&envelope)
        .map_err(|err| pipeline_error("send failed", err))?;
    debug!(channel = %args.target.channel, delivered = response.delivered(), "send finished");

    let name = envelope.get("name").and_then(serde_json::Value::as_str);
    print_send(pipe.channel_name(), name, response, frame_size, format);

    if response.is_success() {
        Ok(SUCCESS)
    } else {
        Err(CliError::new(
            FAILURE,
            format!("channel '{}' rejected the frame (full)", args.target.channel),
        ))
    }
}

fn resolve_value(args: &SendArgs) -> CliResult<Option<Value>> {
    if let Some(text) = &args.text {
        return Ok(Some(Value::Text(text.clone())));
    }
    if let Some(v) = args.int {
        return Ok(Some(Value::Int(v)));
    }
    if let Some(v) = args.long {
        return Ok(Some(Value::Long(v)));
    }
    if let Some(v) = args.float {
        return Ok(Some(Value::Float(v)));
    }
    if let Some(v) = args.double {
        return Ok(Some(Value::Double(v)));
    }
    if let Some(v) = args.boolean {
        return Ok(Some(Value::Bool(v)));
    }
    if let Some(raw) = &args.bytes_hex {
        let bytes = hex::decode(raw.trim())
            .map_err(|err| CliError::new(USAGE, format!("--bytes-hex is not valid hex: {err}")))?;
        return Ok(Some(Value::Bytes(bytes::Bytes::from(bytes))));
    }
    Ok(None)
}

fn resolve_envelope(args: &SendArgs) -> CliResult<serde_json::Value> {
    if let Some(raw) = &args.json {
        return complete_json_envelope(raw, args.name.as_deref());
    }

    let name = args.name.clone();
    let sent_at = Utc::now().fixed_offset();
    let envelope = match resolve_value(args)? {
        Some(value) => serde_json::to_value(DynamicEnvelope::with_timestamp(name, sent_at, value)),
        None => serde_json::to_value(Envelope::with_timestamp(name, sent_at)),
    };
    envelope.map_err(|err| CliError::new(USAGE, format!("envelope is not serializable: {err}")))
}

fn complete_json_envelope(raw: &str, name: Option<&str>) -> CliResult<serde_json::Value> {
    let mut envelope: serde_json::Value = serde_json::from_str(raw)
        .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
    let fields = envelope
        .as_object_mut()
        .ok_or_else(|| CliError::new(USAGE, "--json must be a JSON object"))?;

    if let Some(name) = name {
        fields.insert("name".to_string(), name.into());
    } else if !fields.contains_key("name") && !fields.contains_key("Name") {
        fields.insert("name".to_string(), serde_json::Value::Null);
    }
    if !fields.contains_key("sentAt") && !fields.contains_key("SentAt") {
        fields.insert(
            "sentAt".to_string(),
            Utc::now().fixed_offset().to_rfc3339().into(),
        );
    }
    Ok(envelope)
}
