//! Command Dispatcher
//!
//! Executes one [`Command`] against the [`BridgeContext`] on the host thread
//! and produces the value destined for the answer channel, if any. Nothing
//! in here ever waits on the compute side.

use std::time::Instant;

use super::answer::Answer;
use super::protocol::{Arg, Command};
use crate::core::context::BridgeContext;
use crate::core::error::{AnswerError, BridgeResult};
use crate::platform::{Event, EventKind};
use crate::render::{Color, DrawCommand};
use crate::resources::{Handle, ImageFormat, UploadedImage};
use crate::ui::Element;

/// Decodes a wire name plus positional arguments, then dispatches.
pub fn dispatch_named(ctx: &mut BridgeContext, name: &str, args: &[Arg]) -> BridgeResult<Option<Answer>> {
    let command = Command::decode(name, args)?;
    dispatch(ctx, command)
}

/// Runs `command` and checks the produced value against its declared answer type.
pub fn dispatch(ctx: &mut BridgeContext, command: Command) -> BridgeResult<Option<Answer>> {
    let name = command.name();
    let expected = command.answer_type();
    tracing::trace!(target: "bridge::dispatch", command = name, "Dispatching");

    let answer = execute(ctx, command)?;
    match (expected, &answer) {
        (Some(ty), Some(value)) => value.check(ty)?,
        (None, None) => {}
        (Some(ty), None) => {
            return Err(AnswerError::TypeMismatch {
                expected: ty.name(),
                actual: "nothing",
            }
            .into())
        }
        (None, Some(value)) => {
            return Err(AnswerError::TypeMismatch {
                expected: "nothing",
                actual: value.answer_type().name(),
            }
            .into())
        }
    }
    Ok(answer)
}

fn element_mut(ctx: &mut BridgeContext, raw: u32) -> BridgeResult<&mut Element> {
    Ok(ctx.elements.table_mut().get_mut(Handle::from_raw(raw))?)
}

fn element(ctx: &BridgeContext, raw: u32) -> BridgeResult<&Element> {
    Ok(ctx.elements.table().get(Handle::from_raw(raw))?)
}

fn record(ctx: &mut BridgeContext, raw: u32, command: DrawCommand) -> BridgeResult<Option<Answer>> {
    ctx.canvas.record(Handle::from_raw(raw), command)?;
    Ok(None)
}

fn text_answer(value: Option<&str>) -> Answer {
    Answer::Bytes(value.unwrap_or_default().as_bytes().to_vec())
}

fn len_answer(value: Option<&str>) -> Answer {
    Answer::Int(value.map_or(0, str::len) as i64)
}

fn execute(ctx: &mut BridgeContext, command: Command) -> BridgeResult<Option<Answer>> {
    let answer = match command {
        // ------------------------------------------------------------------
        // Elements
        // ------------------------------------------------------------------
        Command::ElementCreate { tag, kind } => {
            let handle = ctx.elements.table_mut().create(Element::new(tag, kind))?;
            Answer::Int(handle.raw() as i64)
        }
        Command::ElementAppend { parent, child } => {
            ctx.elements
                .append(Handle::from_raw(parent), Handle::from_raw(child))?;
            return Ok(None);
        }
        Command::ElementSetRoot { element } => {
            ctx.elements.set_root(Handle::from_raw(element))?;
            return Ok(None);
        }
        Command::ElementSetText { element, text } => {
            element_mut(ctx, element)?.set_text(text);
            return Ok(None);
        }
        Command::ElementGetTextLength { element: h } => Answer::Int(element(ctx, h)?.text_len() as i64),
        Command::ElementGetText { element: h } => text_answer(Some(element(ctx, h)?.text())),
        Command::ElementSetAttribute { element, name, value } => {
            element_mut(ctx, element)?.set_attribute(name, value);
            return Ok(None);
        }
        Command::ElementRemoveAttribute { element, name } => {
            element_mut(ctx, element)?.remove_attribute(&name);
            return Ok(None);
        }
        Command::ElementGetAttributeLength { element: h, name } => len_answer(element(ctx, h)?.attribute(&name)),
        Command::ElementGetAttribute { element: h, name } => text_answer(element(ctx, h)?.attribute(&name)),
        Command::ElementSetStyle { element, name, value } => {
            element_mut(ctx, element)?.set_style(name, value);
            return Ok(None);
        }
        Command::ElementRemoveStyle { element, name } => {
            element_mut(ctx, element)?.remove_style(&name);
            return Ok(None);
        }
        Command::ElementGetStyleLength { element: h, name } => len_answer(element(ctx, h)?.style(&name)),
        Command::ElementGetStyle { element: h, name } => text_answer(element(ctx, h)?.style(&name)),
        Command::ElementGetValue { element: h } => Answer::Float(element(ctx, h)?.value()),
        Command::ElementSetPos { element, x, y } => {
            let el = element_mut(ctx, element)?;
            el.x = x;
            el.y = y;
            return Ok(None);
        }
        Command::ElementSetSize { element, width, height } => {
            let el = element_mut(ctx, element)?;
            el.width = width;
            el.height = height;
            if el.kind == "label" {
                el.set_style("line-height", format!("{}px", height));
            }
            ctx.push_event(Event::targeted(EventKind::Resize, element));
            return Ok(None);
        }
        Command::ElementGetWidth { element: h } => Answer::Int(element(ctx, h)?.width as i64),
        Command::ElementGetHeight { element: h } => Answer::Int(element(ctx, h)?.height as i64),

        // ------------------------------------------------------------------
        // Canvas
        // ------------------------------------------------------------------
        Command::CanvasOpenContext { element } => {
            let owner = ctx.elements.table().get(Handle::from_raw(element))?;
            let handle = ctx.canvas.open_context(element, owner)?;
            Answer::Int(handle.raw() as i64)
        }
        Command::CanvasSetColor { ctx: c, r, g, b, a } => {
            return record(ctx, c, DrawCommand::SetColor(Color::rgba(r, g, b, a)))
        }
        Command::CanvasMoveTo { ctx: c, x, y } => return record(ctx, c, DrawCommand::MoveTo { x, y }),
        Command::CanvasLineTo { ctx: c, x, y } => return record(ctx, c, DrawCommand::LineTo { x, y }),
        Command::CanvasRectPath { ctx: c, x, y, width, height } => {
            return record(ctx, c, DrawCommand::RectPath { x, y, width, height })
        }
        Command::CanvasEllipse { ctx: c, x, y, width, height } => {
            return record(ctx, c, DrawCommand::Ellipse { x, y, width, height })
        }
        Command::CanvasFillText { ctx: c, text, x, y } => {
            return record(ctx, c, DrawCommand::FillText { text, x, y })
        }
        Command::CanvasFillImage { ctx: c, image, x, y } => {
            ctx.images.get(Handle::from_raw(image))?;
            return record(ctx, c, DrawCommand::FillImage { image, x, y });
        }
        Command::CanvasFill { ctx: c } => return record(ctx, c, DrawCommand::Fill),
        Command::CanvasStroke { ctx: c } => return record(ctx, c, DrawCommand::Stroke),

        // ------------------------------------------------------------------
        // Resources
        // ------------------------------------------------------------------
        Command::ResourceUploadImage { width, height, stride, is_rgb, bytes } => {
            let image = UploadedImage::new(width, height, stride, ImageFormat::from_is_rgb(is_rgb), bytes)?;
            let handle = ctx.images.create(image)?;
            tracing::debug!(target: "bridge::dispatch", image = handle.raw(), width, height, "Image uploaded");
            Answer::Int(handle.raw() as i64)
        }

        // ------------------------------------------------------------------
        // Audio
        // ------------------------------------------------------------------
        Command::AudioCreateSource { sample_rate, delay_seconds } => {
            let handle = ctx.audio.create_source(sample_rate, delay_seconds)?;
            Answer::Int(handle.raw() as i64)
        }
        Command::AudioCopyToChannel { source, samples, channel } => {
            ctx.audio.copy_to_channel(Handle::from_raw(source), &samples, channel)?;
            return Ok(None);
        }
        Command::AudioUpload { source } => {
            ctx.audio.upload(Handle::from_raw(source), Instant::now())?;
            return Ok(None);
        }

        // ------------------------------------------------------------------
        // Network
        // ------------------------------------------------------------------
        Command::NetFetch { url } => Answer::Int(ctx.network.fetch(&url)?.raw() as i64),
        Command::NetIsReady { request } => Answer::Bool(ctx.network.is_ready(Handle::from_raw(request))?),
        Command::NetGetStatus { request } => Answer::Int(ctx.network.status(Handle::from_raw(request))? as i64),
        Command::NetRead { request, max_len } => {
            // 单次读取不超过应答槽容量
            let max_len = (max_len as usize).min(ctx.max_answer_bytes);
            Answer::Bytes(ctx.network.read(Handle::from_raw(request), max_len)?)
        }

        // ------------------------------------------------------------------
        // Events
        // ------------------------------------------------------------------
        Command::EventHasPending => Answer::Bool(ctx.events.has_pending()),
        Command::EventPop => Answer::Int(ctx.events.pop()? as i64),
        Command::EventGetType { event } => Answer::Int(ctx.events.type_of(event)?.code() as i64),
        Command::EventGetTarget { event } => Answer::Int(ctx.events.target_of(event)? as i64),
        Command::EventGetArg { event, index } => Answer::Int(ctx.events.arg_of(event, index as usize)?),

        Command::StopExecution => {
            tracing::warn!(target: "bridge::dispatch", "Compute side requested stop");
            ctx.stop();
            return Ok(None);
        }
    };
    Ok(Some(answer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::core::context::Backends;
    use crate::core::error::{AudioError, BridgeError, DispatchError, EventError, ResourceError};
    use crate::network::MemoryFetcher;

    fn context() -> BridgeContext {
        BridgeContext::new(
            &BridgeConfig::default(),
            Backends::with_fetcher(Box::new(MemoryFetcher::new())),
        )
    }

    fn run(ctx: &mut BridgeContext, name: &str, args: Vec<Arg>) -> BridgeResult<Option<Answer>> {
        dispatch_named(ctx, name, &args)
    }

    #[test]
    fn test_create_set_text_get_length() {
        let mut ctx = context();
        let h = run(&mut ctx, "element-create", vec!["button".into(), "push-button".into()]).unwrap();
        assert_eq!(h, Some(Answer::Int(0)));
        assert_eq!(run(&mut ctx, "element-set-text", vec![0i64.into(), "OK".into()]).unwrap(), None);
        assert_eq!(
            run(&mut ctx, "element-get-text-length", vec![0i64.into()]).unwrap(),
            Some(Answer::Int(2))
        );
        assert_eq!(
            run(&mut ctx, "element-get-text", vec![0i64.into()]).unwrap(),
            Some(Answer::Bytes(b"OK".to_vec()))
        );
    }

    #[test]
    fn test_unknown_command_is_surfaced() {
        let mut ctx = context();
        let err = run(&mut ctx, "element-teleport", vec![]).unwrap_err();
        assert!(matches!(err, BridgeError::Dispatch(DispatchError::UnknownCommand(_))));
    }

    #[test]
    fn test_invalid_handle_is_checked() {
        let mut ctx = context();
        let err = dispatch(&mut ctx, Command::ElementGetWidth { element: 4 }).unwrap_err();
        assert!(matches!(err, BridgeError::Resource(ResourceError::InvalidHandle { .. })));
    }

    #[test]
    fn test_set_size_emits_resize() {
        let mut ctx = context();
        dispatch(&mut ctx, Command::ElementCreate { tag: "span".into(), kind: "label".into() }).unwrap();
        dispatch(&mut ctx, Command::ElementSetSize { element: 0, width: 40, height: 20 }).unwrap();
        assert_eq!(dispatch(&mut ctx, Command::ElementGetHeight { element: 0 }).unwrap(), Some(Answer::Int(20)));

        let id = ctx.events.pop().unwrap();
        assert_eq!(ctx.events.type_of(id).unwrap(), EventKind::Resize);
        assert_eq!(ctx.events.target_of(id).unwrap(), 0);
        assert_eq!(
            ctx.elements.table().get(Handle::from_raw(0)).unwrap().style("line-height"),
            Some("20px")
        );
    }

    #[test]
    fn test_attributes_and_styles() {
        let mut ctx = context();
        dispatch(&mut ctx, Command::ElementCreate { tag: "div".into(), kind: "container".into() }).unwrap();
        let get_len = |ctx: &mut BridgeContext| {
            dispatch(ctx, Command::ElementGetAttributeLength { element: 0, name: "title".into() }).unwrap()
        };
        assert_eq!(get_len(&mut ctx), Some(Answer::Int(0)));
        dispatch(
            &mut ctx,
            Command::ElementSetAttribute { element: 0, name: "title".into(), value: "héllo".into() },
        )
        .unwrap();
        assert_eq!(get_len(&mut ctx), Some(Answer::Int(6)));
        dispatch(&mut ctx, Command::ElementRemoveAttribute { element: 0, name: "title".into() }).unwrap();
        assert_eq!(
            dispatch(&mut ctx, Command::ElementGetAttribute { element: 0, name: "title".into() }).unwrap(),
            Some(Answer::Bytes(Vec::new()))
        );

        dispatch(
            &mut ctx,
            Command::ElementSetStyle { element: 0, name: "color".into(), value: "red".into() },
        )
        .unwrap();
        assert_eq!(
            dispatch(&mut ctx, Command::ElementGetStyle { element: 0, name: "color".into() }).unwrap(),
            Some(Answer::Bytes(b"red".to_vec()))
        );
    }

    #[test]
    fn test_draw_commands_are_deferred_until_flush() {
        let mut ctx = context();
        dispatch(&mut ctx, Command::ElementCreate { tag: "canvas".into(), kind: "canvas".into() }).unwrap();
        dispatch(&mut ctx, Command::ElementSetSize { element: 0, width: 16, height: 16 }).unwrap();
        let c = dispatch(&mut ctx, Command::CanvasOpenContext { element: 0 })
            .unwrap()
            .and_then(|a| a.as_int())
            .unwrap() as u32;

        dispatch(&mut ctx, Command::CanvasSetColor { ctx: c, r: 255, g: 0, b: 0, a: 255 }).unwrap();
        dispatch(&mut ctx, Command::CanvasRectPath { ctx: c, x: 0.0, y: 0.0, width: 10.0, height: 10.0 }).unwrap();
        dispatch(&mut ctx, Command::CanvasFill { ctx: c }).unwrap();

        let surface = ctx.canvas.context(Handle::from_raw(c)).unwrap().surface();
        assert_eq!(surface.pixels().unwrap().get_pixel(5, 5).0, [0, 0, 0, 0]);

        assert_eq!(ctx.flush_canvas().commands, 3);
        let surface = ctx.canvas.context(Handle::from_raw(c)).unwrap().surface();
        assert_eq!(surface.pixels().unwrap().get_pixel(5, 5).0, [255, 0, 0, 255]);
        assert!(surface.path_is_empty());
    }

    #[test]
    fn test_fill_image_validates_handle() {
        let mut ctx = context();
        dispatch(&mut ctx, Command::ElementCreate { tag: "canvas".into(), kind: "canvas".into() }).unwrap();
        dispatch(&mut ctx, Command::CanvasOpenContext { element: 0 }).unwrap();
        let err = dispatch(&mut ctx, Command::CanvasFillImage { ctx: 0, image: 0, x: 0, y: 0 }).unwrap_err();
        assert!(matches!(err, BridgeError::Resource(_)));
    }

    #[test]
    fn test_upload_image() {
        let mut ctx = context();
        let answer = dispatch(
            &mut ctx,
            Command::ResourceUploadImage { width: 2, height: 2, stride: 6, is_rgb: true, bytes: vec![0; 12] },
        )
        .unwrap();
        assert_eq!(answer, Some(Answer::Int(0)));
        let err = dispatch(
            &mut ctx,
            Command::ResourceUploadImage { width: 2, height: 2, stride: 6, is_rgb: true, bytes: vec![0; 4] },
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::Resource(ResourceError::InvalidImage(_))));
    }

    #[test]
    fn test_event_pop_on_empty_queue_fails() {
        let mut ctx = context();
        assert_eq!(dispatch(&mut ctx, Command::EventHasPending).unwrap(), Some(Answer::Bool(false)));
        let err = dispatch(&mut ctx, Command::EventPop).unwrap_err();
        assert!(matches!(err, BridgeError::Event(EventError::QueueEmpty)));
    }

    #[test]
    fn test_net_read_is_clamped_to_slot() {
        let fetcher = MemoryFetcher::new();
        fetcher.serve("http://x/big", vec![7u8; 100]);
        let config = BridgeConfig {
            answer: crate::config::AnswerConfig { capacity_bytes: 36, ..Default::default() },
            ..Default::default()
        };
        let mut ctx = BridgeContext::new(&config, Backends::with_fetcher(Box::new(fetcher)));
        dispatch(&mut ctx, Command::NetFetch { url: "http://x/big".into() }).unwrap();
        ctx.network.poll();
        let answer = dispatch(&mut ctx, Command::NetRead { request: 0, max_len: 1000 }).unwrap();
        assert_eq!(answer.and_then(Answer::into_bytes).map(|b| b.len()), Some(32));
    }

    #[test]
    fn test_out_of_range_audio_arguments_fail_cleanly() {
        let mut ctx = context();
        let err = dispatch(&mut ctx, Command::AudioCreateSource { sample_rate: 44_100.0, delay_seconds: 1e30 })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Audio(AudioError::InvalidDelay(_))));
        let err = dispatch(&mut ctx, Command::AudioCreateSource { sample_rate: 1e-40, delay_seconds: 0.0 })
            .unwrap_err();
        assert!(matches!(err, BridgeError::Audio(AudioError::InvalidSampleRate(_))));
        assert!(ctx.audio.sources().is_empty());
    }

    #[test]
    fn test_huge_canvas_is_refused() {
        let mut ctx = context();
        dispatch(&mut ctx, Command::ElementCreate { tag: "canvas".into(), kind: "canvas".into() }).unwrap();
        dispatch(&mut ctx, Command::ElementSetSize { element: 0, width: u32::MAX, height: u32::MAX }).unwrap();
        let err = dispatch(&mut ctx, Command::CanvasOpenContext { element: 0 }).unwrap_err();
        assert!(matches!(err, BridgeError::Resource(ResourceError::SurfaceTooLarge { .. })));

        // 缩小后可以正常打开
        dispatch(&mut ctx, Command::ElementSetSize { element: 0, width: 8, height: 8 }).unwrap();
        assert_eq!(dispatch(&mut ctx, Command::CanvasOpenContext { element: 0 }).unwrap(), Some(Answer::Int(0)));
    }

    #[test]
    fn test_fill_image_far_off_canvas_is_clipped() {
        let mut ctx = context();
        dispatch(&mut ctx, Command::ElementCreate { tag: "canvas".into(), kind: "canvas".into() }).unwrap();
        dispatch(&mut ctx, Command::ElementSetSize { element: 0, width: 8, height: 8 }).unwrap();
        dispatch(&mut ctx, Command::CanvasOpenContext { element: 0 }).unwrap();
        dispatch(
            &mut ctx,
            Command::ResourceUploadImage { width: 2, height: 2, stride: 8, is_rgb: false, bytes: vec![255; 16] },
        )
        .unwrap();
        for (x, y) in [(i32::MAX, 0), (0, i32::MAX), (i32::MIN, i32::MIN)] {
            dispatch(&mut ctx, Command::CanvasFillImage { ctx: 0, image: 0, x, y }).unwrap();
        }
        let stats = ctx.flush_canvas();
        assert_eq!((stats.commands, stats.skipped), (3, 0));
        let surface = ctx.canvas.context(Handle::from_raw(0)).unwrap().surface();
        assert!(surface.pixels().unwrap().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_stop_execution() {
        let mut ctx = context();
        assert_eq!(dispatch(&mut ctx, Command::StopExecution).unwrap(), None);
        assert!(!ctx.is_running());
    }
}
