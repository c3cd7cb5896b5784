//! Typed lookups into schema-less element trees.
//!
//! A lookup either yields a value of the requested type or does nothing:
//! a missing key, a non-map input and a type mismatch are all "no match",
//! never an error. Trees coming off the wire are heterogeneous and partial,
//! and callers only act on what is actually there.

use crate::{Element, ListType, MapType};

/// Types that can be borrowed out of an [`Element`] when the tag matches.
pub trait FromElement<'a>: Sized {
    fn from_element(element: &'a Element) -> Option<Self>;
}

impl<'a> FromElement<'a> for &'a MapType {
    fn from_element(element: &'a Element) -> Option<Self> {
        element.as_map()
    }
}

impl<'a> FromElement<'a> for &'a ListType {
    fn from_element(element: &'a Element) -> Option<Self> {
        element.as_list()
    }
}

impl<'a> FromElement<'a> for i64 {
    fn from_element(element: &'a Element) -> Option<Self> {
        element.as_int()
    }
}

impl<'a> FromElement<'a> for f64 {
    fn from_element(element: &'a Element) -> Option<Self> {
        element.as_float()
    }
}

impl<'a> FromElement<'a> for &'a str {
    fn from_element(element: &'a Element) -> Option<Self> {
        element.as_str()
    }
}

/// Booleans travel as ints; only 0 and 1 are accepted.
impl<'a> FromElement<'a> for bool {
    fn from_element(element: &'a Element) -> Option<Self> {
        match element.as_int() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        }
    }
}

/// Matches the `None` scalar.
impl<'a> FromElement<'a> for () {
    fn from_element(element: &'a Element) -> Option<Self> {
        element.is_none().then_some(())
    }
}

/// Look up `name` in `element` and hand it to `on_found` if `element` is a map
/// and the value has type `T`.
pub fn find<'a, T, F>(element: &'a Element, name: &str, on_found: F)
where
    T: FromElement<'a>,
    F: FnOnce(T),
{
    if let Some(map) = element.as_map() {
        find_in(map, name, on_found);
    }
}

/// Map flavour of [`find`].
pub fn find_in<'a, T, F>(map: &'a MapType, name: &str, on_found: F)
where
    T: FromElement<'a>,
    F: FnOnce(T),
{
    if let Some(value) = get::<T>(map, name) {
        on_found(value);
    }
}

/// Same match as [`find_in`], returned as a value.
pub fn get<'a, T: FromElement<'a>>(map: &'a MapType, name: &str) -> Option<T> {
    map.get(name).and_then(T::from_element)
}
