//! 主机侧输入翻译
//!
//! 把原生输入（鼠标、触摸、滚轮、滑块、窗口尺寸变化）翻译成桥接事件。

use serde::{Deserialize, Serialize};

use super::events::{Event, EventKind};
use crate::core::error::ResourceResult;
use crate::resources::Handle;
use crate::ui::ElementTree;

/// 原生输入
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UiInput {
    Click { element: u32 },
    Change { element: u32 },
    MouseDown { element: u32, button: u32, x: i32, y: i32 },
    MouseUp { element: u32, button: u32, x: i32, y: i32 },
    MouseLeave { element: u32, x: i32, y: i32 },
    MouseMove { element: u32, x: i32, y: i32 },
    TouchStart { element: u32, x: i32, y: i32 },
    TouchEnd { element: u32, x: i32, y: i32 },
    TouchMove { element: u32, x: i32, y: i32 },
    Wheel { element: u32, delta_x: f64, delta_y: f64 },
    SliderInput { element: u32, value: f64 },
    WindowResize,
}

/// 只保留方向
fn sign(delta: f64) -> i64 {
    if delta > 0.0 {
        1
    } else if delta < 0.0 {
        -1
    } else {
        0
    }
}

fn pointer_button(element: u32, button: u32, down: bool, x: i32, y: i32) -> Event {
    Event::targeted(EventKind::PointerButton, element).with_args([
        button as i64,
        down as i64,
        x as i64,
        y as i64,
    ])
}

fn pointer_move(element: u32, x: i32, y: i32) -> Event {
    Event::targeted(EventKind::PointerMove, element).with_args([x as i64, y as i64])
}

/// 翻译一条输入；不产生事件时返回 `Ok(None)`
///
/// 目标元素句柄会被校验；滑块输入同时更新元素的数值。
pub fn translate(input: &UiInput, tree: &mut ElementTree) -> ResourceResult<Option<Event>> {
    let event = match *input {
        UiInput::Click { element } => {
            // 只有按钮产生 click
            if tree.table().get(Handle::from_raw(element))?.is_button() {
                Some(Event::targeted(EventKind::Click, element))
            } else {
                None
            }
        }
        UiInput::Change { element } => {
            tree.table().get(Handle::from_raw(element))?;
            Some(Event::targeted(EventKind::Change, element))
        }
        UiInput::MouseDown { element, button, x, y } => {
            tree.table().get(Handle::from_raw(element))?;
            Some(pointer_button(element, button, true, x, y))
        }
        UiInput::MouseUp { element, button, x, y } => {
            tree.table().get(Handle::from_raw(element))?;
            Some(pointer_button(element, button, false, x, y))
        }
        UiInput::MouseLeave { element, x, y } | UiInput::TouchEnd { element, x, y } => {
            tree.table().get(Handle::from_raw(element))?;
            Some(pointer_button(element, 0, false, x, y))
        }
        UiInput::TouchStart { element, x, y } => {
            tree.table().get(Handle::from_raw(element))?;
            Some(pointer_button(element, 0, true, x, y))
        }
        UiInput::MouseMove { element, x, y } | UiInput::TouchMove { element, x, y } => {
            tree.table().get(Handle::from_raw(element))?;
            Some(pointer_move(element, x, y))
        }
        UiInput::Wheel { element, delta_x, delta_y } => {
            tree.table().get(Handle::from_raw(element))?;
            Some(
                Event::targeted(EventKind::Wheel, element)
                    .with_args([sign(delta_x), sign(delta_y)]),
            )
        }
        UiInput::SliderInput { element, value } => {
            tree.table_mut().get_mut(Handle::from_raw(element))?.set_value(value);
            Some(Event::targeted(EventKind::SliderInput, element))
        }
        UiInput::WindowResize => Some(match tree.root() {
            Some(root) => Event::targeted(EventKind::Resize, root.raw()),
            None => Event::new(EventKind::Resize),
        }),
    };
    Ok(event)
}
