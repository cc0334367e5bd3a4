use std::thread;
use std::time::Duration;

use host_bridge::bindings::ComputeStub;
use host_bridge::config::BridgeConfig;
use host_bridge::core::{init_logging, BridgeBuilder, BridgeResult};
use host_bridge::network::MemoryFetcher;
use host_bridge::platform::{EventKind, UiInput};

const GREETING_URL: &str = "memory://greeting";

fn main() {
    if let Err(e) = run() {
        eprintln!("Bridge failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> BridgeResult<()> {
    let mut config = BridgeConfig::load_or_default();
    config.apply_env_overrides();
    init_logging(&config.logging);

    let fetcher = MemoryFetcher::new();
    fetcher.serve(GREETING_URL, b"hello from the host side".to_vec());

    let bridge = BridgeBuilder::new(config).fetcher(fetcher).build()?;
    let input = bridge.handle.clone();
    let mut compute = bridge.compute;
    let host = bridge.host.spawn()?;

    let program = thread::Builder::new()
        .name("bridge-compute".to_string())
        .spawn(move || demo_program(&mut compute))?;

    // 模拟用户点击按钮（句柄 1，见 demo_program）
    thread::sleep(Duration::from_millis(200));
    input.post_input(UiInput::Click { element: 1 })?;

    match program.join() {
        Ok(result) => result?,
        Err(_) => tracing::error!(target: "bridge::compute", "Compute thread panicked"),
    }
    input.shutdown();
    if let Ok(host) = host.join() {
        tracing::info!(target: "bridge::host", stats = ?host.stats(), "Host finished");
    }
    Ok(())
}

fn demo_program(compute: &mut ComputeStub) -> BridgeResult<()> {
    let root = compute.create_element("div", "container")?;
    compute.set_root(root)?;

    let button = compute.create_element("button", "push-button")?;
    compute.set_text(button, "OK")?;
    compute.append(root, button)?;
    let len = compute.text_len(button)?;
    compute.print(&format!("button text is {} bytes", len));

    let canvas = compute.create_element("canvas", "canvas")?;
    compute.set_size(canvas, 64, 64)?;
    compute.append(root, canvas)?;
    let ctx = compute.open_context(canvas)?;
    compute.set_color(ctx, 255, 0, 0, 255)?;
    compute.rect_path(ctx, 8.0, 8.0, 48.0, 48.0)?;
    compute.fill(ctx)?;

    let request = compute.fetch(GREETING_URL)?;
    while !compute.is_ready(request)? {
        compute.yield_now();
    }
    let mut body = Vec::new();
    loop {
        let chunk = compute.read(request, 8)?;
        if chunk.is_empty() {
            break;
        }
        body.extend(chunk);
    }
    compute.print(&String::from_utf8_lossy(&body));

    let started = compute.now_ms();
    'events: while compute.now_ms() - started < 5_000 {
        while compute.has_pending_event()? {
            let event = compute.pop_event()?;
            if compute.event_type(event)? == EventKind::Click && compute.event_target(event)? == button {
                compute.print("button clicked");
                break 'events;
            }
        }
        compute.yield_now();
    }

    compute.stop_execution()
}
