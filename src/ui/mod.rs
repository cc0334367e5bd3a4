//! UI 元素模块
//!
//! 主机侧保存的元素模型：标签、类别、文本、数值、位置尺寸、属性与样式。
//! 元素真正如何显示属于主机实现，这里只保存计算侧通过命令可观察到的状态。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::resources::{Handle, ResourceTable};

/// 元素句柄
pub type ElementHandle = Handle<Element>;

/// 主机侧元素
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// 标签名，例如 `button`、`input`、`canvas`
    pub tag: String,
    /// 组件类别，例如 `push-button`、`label`
    pub kind: String,
    text: String,
    /// 滑块等数值型元素的当前值
    value: f64,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    attributes: BTreeMap<String, String>,
    styles: BTreeMap<String, String>,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
}

impl Element {
    pub fn new(tag: impl Into<String>, kind: impl Into<String>) -> Self {
        let mut element = Self {
            tag: tag.into(),
            kind: kind.into(),
            ..Default::default()
        };
        element.styles.insert("position".to_string(), "absolute".to_string());
        element
    }

    pub fn is_button(&self) -> bool {
        self.tag.eq_ignore_ascii_case("button")
    }

    pub fn is_input(&self) -> bool {
        self.tag.eq_ignore_ascii_case("input")
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 设置文本；输入框的文本即其值
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        if self.is_input() {
            if let Ok(v) = self.text.trim().parse::<f64>() {
                self.value = v;
            }
        }
    }

    /// UTF-8 字节长度
    pub fn text_len(&self) -> usize {
        self.text.len()
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        if self.is_input() {
            self.text = value.to_string();
        }
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_style(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.styles.insert(name.into(), value.into());
    }

    pub fn remove_style(&mut self, name: &str) -> Option<String> {
        self.styles.remove(name)
    }

    pub fn style(&self, name: &str) -> Option<&str> {
        self.styles.get(name).map(String::as_str)
    }
}

/// 元素表及根元素
#[derive(Debug)]
pub struct ElementTree {
    elements: ResourceTable<Element>,
    root: Option<ElementHandle>,
}

impl Default for ElementTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementTree {
    pub fn new() -> Self {
        Self {
            elements: ResourceTable::new("element"),
            root: None,
        }
    }

    pub fn table(&self) -> &ResourceTable<Element> {
        &self.elements
    }

    pub fn table_mut(&mut self) -> &mut ResourceTable<Element> {
        &mut self.elements
    }

    pub fn root(&self) -> Option<ElementHandle> {
        self.root
    }

    /// 挂接子元素；已有父节点时先从原父节点摘除
    pub fn append(
        &mut self,
        parent: ElementHandle,
        child: ElementHandle,
    ) -> crate::core::error::ResourceResult<()> {
        // 先校验两端句柄
        self.elements.get(parent)?;
        let old_parent = self.elements.get(child)?.parent;
        if let Some(old) = old_parent {
            if let Ok(old) = self.elements.get_mut(Handle::from_raw(old)) {
                old.children.retain(|&c| c != child.raw());
            }
        }
        self.elements.get_mut(child)?.parent = Some(parent.raw());
        self.elements.get_mut(parent)?.children.push(child.raw());
        Ok(())
    }

    /// 设为根元素并铺满窗口
    pub fn set_root(&mut self, root: ElementHandle) -> crate::core::error::ResourceResult<()> {
        let element = self.elements.get_mut(root)?;
        element.set_style("width", "100%");
        element.set_style("height", "100%");
        self.root = Some(root);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_length_is_utf8_bytes() {
        let mut element = Element::new("span", "label");
        element.set_text("OK");
        assert_eq!(element.text_len(), 2);
        element.set_text("好");
        assert_eq!(element.text_len(), 3);
    }

    #[test]
    fn test_input_text_is_value() {
        let mut element = Element::new("input", "text-field");
        element.set_text("2.5");
        assert_eq!(element.value(), 2.5);
        element.set_value(4.0);
        assert_eq!(element.text(), "4");
    }

    #[test]
    fn test_missing_attribute_is_none() {
        let mut element = Element::new("div", "container");
        assert_eq!(element.attribute("id"), None);
        element.set_attribute("id", "main");
        assert_eq!(element.attribute("id"), Some("main"));
        assert_eq!(element.remove_attribute("id"), Some("main".to_string()));
        assert_eq!(element.style("position"), Some("absolute"));
    }

    #[test]
    fn test_append_moves_child() {
        let mut tree = ElementTree::new();
        let a = tree.table_mut().create(Element::new("div", "container")).unwrap();
        let b = tree.table_mut().create(Element::new("div", "container")).unwrap();
        let c = tree.table_mut().create(Element::new("span", "label")).unwrap();
        tree.append(a, c).unwrap();
        tree.append(b, c).unwrap();
        assert!(tree.table().get(a).unwrap().children.is_empty());
        assert_eq!(tree.table().get(b).unwrap().children, vec![c.raw()]);
        assert_eq!(tree.table().get(c).unwrap().parent, Some(b.raw()));
    }

    #[test]
    fn test_set_root() {
        let mut tree = ElementTree::new();
        let root = tree.table_mut().create(Element::new("div", "container")).unwrap();
        assert!(tree.set_root(Handle::from_raw(7)).is_err());
        tree.set_root(root).unwrap();
        assert_eq!(tree.root(), Some(root));
        assert_eq!(tree.table().get(root).unwrap().style("width"), Some("100%"));
    }
}
