//! Replays a captured event-stream body through the full pipeline.
//!
//! ```text
//! cargo run -p llm-stream --example replay_sse -- anthropic capture.sse
//! ```
use llm_stream::observability::init_observability;
use llm_stream::prelude::*;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), StreamError> {
    init_observability();

    let mut args = std::env::args().skip(1);
    let (Some(vendor), Some(path)) = (args.next(), args.next()) else {
        return Err(StreamError::Config(
            "usage: replay_sse <vendor> <capture.sse>".into(),
        ));
    };
    let vendor = Vendor::from_name(&vendor)?;
    let body = std::fs::read(&path)
        .map_err(|err| StreamError::Config(format!("cannot read {path}: {err}")))?;

    let config = StreamConfig::from_env()?;
    let capacity = config.channel_capacity;
    let registry = DecoderRegistry::with_defaults(config);
    let stream = vendor.open(&registry, ResponseBody::from_bytes("text/event-stream", body));
    let mut relay = spawn_relay(stream, capacity, &CancellationToken::new());

    while let Some(event) = relay.next_event().await {
        match (&event.kind, event.text()) {
            (EventKind::TextDelta, Some(text)) => print!("{text}"),
            (EventKind::MessageStop, _) => {
                println!();
                if let Some(message) = &event.message {
                    println!(
                        "[stop] reason={} input={} output={}",
                        message
                            .stop_reason()
                            .map(StopReason::as_str)
                            .unwrap_or("none"),
                        message.usage.input_tokens,
                        message.usage.output_tokens,
                    );
                }
            }
            (kind, _) => eprintln!("[{kind}]"),
        }
    }

    relay.finish().await
}
