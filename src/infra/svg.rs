use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::debug;

use crate::domain::stats::Totals;
use crate::error::{AppError, AppResult};

const CANVAS_WIDTH: f64 = 400.0;
const CHAR_WIDTH: f64 = 9.5;

const NET_TSPAN: usize = 2;
const ADDITIONS_TSPAN: usize = 3;
const DELETIONS_TSPAN: usize = 4;

/// An SVG rendered in memory, not yet written back to its file.
pub struct RenderedDocument {
    pub path: PathBuf,
    contents: String,
}

impl RenderedDocument {
    pub fn write(&self) -> AppResult<()> {
        fs::write(&self.path, &self.contents)?;
        debug!(path = %self.path.display(), "rendered svg");
        Ok(())
    }
}

/// Renders `totals` into the SVG at `path` without touching the file.
pub fn prepare(path: &Path, totals: &Totals) -> AppResult<RenderedDocument> {
    let source = fs::read_to_string(path)?;
    let contents = render_document(&source, totals)
        .map_err(|err| AppError::Render(format!("{}: {err}", path.display())))?;
    Ok(RenderedDocument {
        path: path.to_path_buf(),
        contents,
    })
}

pub fn render_document(source: &str, totals: &Totals) -> AppResult<String> {
    let title_x = title_offset(&totals.summary_label());
    let replacement_for = |index: usize| match index {
        NET_TSPAN => Some(totals.net_label()),
        ADDITIONS_TSPAN => Some(totals.additions_label()),
        DELETIONS_TSPAN => Some(totals.deletions_label()),
        _ => None,
    };

    let mut reader = Reader::from_str(source);
    let mut writer = Writer::new(Vec::new());
    let mut title_seen = false;
    let mut tspan_count = 0;
    let mut pending: Option<String> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(err) => return Err(AppError::Render(format!("invalid SVG document: {err}"))),
        };

        match event {
            Event::Eof => break,
            Event::Start(start) if is_element(&start, b"text") && !title_seen => {
                title_seen = true;
                write(&mut writer, Event::Start(with_x(&start, &title_x)?))?;
            }
            Event::Empty(start) if is_element(&start, b"text") && !title_seen => {
                title_seen = true;
                write(&mut writer, Event::Empty(with_x(&start, &title_x)?))?;
            }
            Event::Start(start) if is_element(&start, b"tspan") => {
                pending = replacement_for(tspan_count);
                tspan_count += 1;
                write(&mut writer, Event::Start(start))?;
            }
            Event::Empty(start) if is_element(&start, b"tspan") => {
                let replacement = replacement_for(tspan_count);
                tspan_count += 1;
                match replacement {
                    Some(value) => {
                        let end = start.to_end().into_owned();
                        write(&mut writer, Event::Start(start))?;
                        write(&mut writer, Event::Text(BytesText::new(&value)))?;
                        write(&mut writer, Event::End(end))?;
                    }
                    None => write(&mut writer, Event::Empty(start))?,
                }
            }
            Event::Text(_) if pending.is_some() => {
                if let Some(value) = pending.take() {
                    write(&mut writer, Event::Text(BytesText::new(&value)))?;
                }
            }
            Event::End(end) if end.name().as_ref() == b"tspan" => {
                if let Some(value) = pending.take() {
                    write(&mut writer, Event::Text(BytesText::new(&value)))?;
                }
                write(&mut writer, Event::End(end))?;
            }
            other => write(&mut writer, other)?,
        }
    }

    if !title_seen {
        return Err(AppError::Render("template has no text element".to_string()));
    }
    if tspan_count <= DELETIONS_TSPAN {
        return Err(AppError::Render(format!(
            "template needs at least {} tspan elements, found {tspan_count}",
            DELETIONS_TSPAN + 1
        )));
    }

    String::from_utf8(writer.into_inner())
        .map_err(|err| AppError::Render(format!("rendered document is not UTF-8: {err}")))
}

fn title_offset(label: &str) -> String {
    let width = label.chars().count() as f64 * CHAR_WIDTH;
    format!("{:?}", (CANVAS_WIDTH - width) / 2.0)
}

fn is_element(start: &BytesStart, name: &[u8]) -> bool {
    start.name().as_ref() == name
}

fn with_x(start: &BytesStart, x: &str) -> AppResult<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = BytesStart::new(name);
    let mut has_x = false;
    for attribute in start.attributes() {
        let attribute =
            attribute.map_err(|err| AppError::Render(format!("invalid attribute: {err}")))?;
        if attribute.key.as_ref() == b"x" {
            element.push_attribute(("x", x));
            has_x = true;
        } else {
            element.push_attribute(attribute);
        }
    }
    if !has_x {
        element.push_attribute(("x", x));
    }
    Ok(element)
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event) -> AppResult<()> {
    writer
        .write_event(event)
        .map_err(|err| AppError::Render(format!("failed to write SVG: {err}")))
}
