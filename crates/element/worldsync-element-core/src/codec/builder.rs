use crate::{Element, ListType, MapType};

use super::Bridge;

#[derive(Debug)]
enum Frame {
    Map(Option<String>, MapType),
    List(Option<String>, ListType),
}

/// Bridge that assembles decode events into [`Element`] trees and keeps the
/// most recent complete top-level element.
#[derive(Debug, Default)]
pub struct ElementBuilder {
    stack: Vec<Frame>,
    last: Option<Element>,
    completed: usize,
}

impl ElementBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last complete top-level element, if any.
    pub fn last_object(&self) -> Option<&Element> {
        self.last.as_ref()
    }

    pub fn take_last_object(&mut self) -> Option<Element> {
        self.last.take()
    }

    /// Number of top-level elements completed so far.
    pub fn completed(&self) -> usize {
        self.completed
    }

    fn attach(&mut self, name: Option<String>, value: Element) {
        match self.stack.last_mut() {
            Some(Frame::Map(_, map)) => {
                map.insert(name.unwrap_or_default(), value);
            }
            Some(Frame::List(_, list)) => list.push(value),
            None => {
                self.last = Some(value);
                self.completed += 1;
            }
        }
    }
}

impl Bridge for ElementBuilder {
    fn map_begin(&mut self, name: Option<&str>) {
        self.stack
            .push(Frame::Map(name.map(str::to_string), MapType::new()));
    }

    fn map_end(&mut self) {
        if let Some(Frame::Map(name, map)) = self.stack.pop() {
            self.attach(name, Element::Map(map));
        }
    }

    fn list_begin(&mut self, name: Option<&str>) {
        self.stack
            .push(Frame::List(name.map(str::to_string), ListType::new()));
    }

    fn list_end(&mut self) {
        if let Some(Frame::List(name, list)) = self.stack.pop() {
            self.attach(name, Element::List(list));
        }
    }

    fn scalar(&mut self, name: Option<&str>, value: Element) {
        self.attach(name.map(str::to_string), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_tree_from_events() {
        let mut b = ElementBuilder::new();
        b.map_begin(None);
        b.scalar(Some("id"), Element::from("7"));
        b.list_begin(Some("contains"));
        b.scalar(None, Element::Int(1));
        b.map_begin(None);
        b.map_end();
        b.list_end();
        b.map_end();

        assert_eq!(b.completed(), 1);
        let tree = b.take_last_object().unwrap();
        assert_eq!(tree.attr("id"), Some(&Element::from("7")));
        assert_eq!(
            tree.attr("contains"),
            Some(&Element::List(vec![Element::Int(1), Element::map()]))
        );
    }

    #[test]
    fn top_level_scalars_count_as_objects() {
        let mut b = ElementBuilder::new();
        b.scalar(None, Element::Int(1));
        b.scalar(None, Element::Int(2));
        assert_eq!(b.completed(), 2);
        assert_eq!(b.last_object(), Some(&Element::Int(2)));
    }
}
