use std::fmt::{self, Write};

use crate::Element;

/// Encode `element` as a single-object stream without extra whitespace.
pub fn encode(element: &Element) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_element(&mut out, element, false);
    out
}

/// Encode `element` with one item per line, indented by nesting depth.
pub fn encode_pretty(element: &Element) -> String {
    let mut out = String::new();
    let _ = write_element(&mut out, element, true);
    out
}

/// Write `element` wrapped in a stream to `out`.
pub fn write_element<W: Write>(out: &mut W, element: &Element, pretty: bool) -> fmt::Result {
    out.write_str("<atlas>")?;
    write_item(out, None, element, pretty, 1)?;
    if pretty {
        out.write_char('\n')?;
    }
    out.write_str("</atlas>")?;
    if pretty {
        out.write_char('\n')?;
    }
    Ok(())
}

fn write_item<W: Write>(
    out: &mut W,
    name: Option<&str>,
    element: &Element,
    pretty: bool,
    depth: usize,
) -> fmt::Result {
    if pretty {
        out.write_char('\n')?;
        for _ in 0..depth {
            out.write_str("  ")?;
        }
    }
    let tag = element.kind().as_str();
    out.write_char('<')?;
    out.write_str(tag)?;
    if let Some(name) = name {
        out.write_str(" name=\"")?;
        write_escaped(out, name)?;
        out.write_char('"')?;
    }

    match element {
        Element::Map(map) => {
            if map.is_empty() {
                return out.write_str("/>");
            }
            out.write_char('>')?;
            for (key, child) in map {
                write_item(out, Some(key), child, pretty, depth + 1)?;
            }
            close_container(out, tag, pretty, depth)
        }
        Element::List(list) => {
            if list.is_empty() {
                return out.write_str("/>");
            }
            out.write_char('>')?;
            for child in list {
                write_item(out, None, child, pretty, depth + 1)?;
            }
            close_container(out, tag, pretty, depth)
        }
        Element::Int(i) => write!(out, ">{i}</{tag}>"),
        // Debug formatting gives the shortest representation that parses back
        // to the same bits, and always includes a decimal point or exponent.
        Element::Float(f) => write!(out, ">{f:?}</{tag}>"),
        Element::String(s) => {
            out.write_char('>')?;
            write_escaped(out, s)?;
            write!(out, "</{tag}>")
        }
        Element::None => out.write_str("/>"),
    }
}

fn close_container<W: Write>(out: &mut W, tag: &str, pretty: bool, depth: usize) -> fmt::Result {
    if pretty {
        out.write_char('\n')?;
        for _ in 0..depth {
            out.write_str("  ")?;
        }
    }
    write!(out, "</{tag}>")
}

fn write_escaped<W: Write>(out: &mut W, text: &str) -> fmt::Result {
    for c in text.chars() {
        match c {
            '&' => out.write_str("&amp;")?,
            '<' => out.write_str("&lt;")?,
            '>' => out.write_str("&gt;")?,
            '"' => out.write_str("&quot;")?,
            '\'' => out.write_str("&apos;")?,
            c => out.write_char(c)?,
        }
    }
    Ok(())
}
