//! Pull parser for the tree-shaped trace-event export.
//!
//! The document root carries a process list (PID + loaded-module list) and
//! an event list. Every child element of an event becomes a field; the
//! `stack` child is special-cased into ordered frames.

use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use shared::{CellValue, StackFrame, UNSYMBOLICATED};

use crate::error::FormatError;

/// One event from the event list: scalar fields plus an optional stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub fields: IndexMap<String, CellValue>,
    pub stack: Option<Vec<StackFrame>>,
}

impl RawEvent {
    pub fn pid(&self) -> Option<i64> {
        self.fields.get("PID").and_then(CellValue::as_number).map(|n| n as i64)
    }
}

/// PID → module path → load base address.
pub type ModuleMap = HashMap<i64, HashMap<String, u64>>;

/// Parse the event log, keeping stack addresses absolute.
pub fn parse(text: &str) -> Result<Vec<RawEvent>, FormatError> {
    Ok(parse_document(text)?.events)
}

/// Parse the event log and make every stack address relative to its
/// module's load base, looked up in the process list by the event's PID.
/// Frames whose module is not listed keep their absolute address.
pub fn parse_resolving(text: &str) -> Result<Vec<RawEvent>, FormatError> {
    let document = parse_document(text)?;
    let mut events = document.events;
    for event in &mut events {
        let Some(pid) = event.pid() else { continue };
        let Some(modules) = document.module_map.get(&pid) else { continue };
        if let Some(stack) = &mut event.stack {
            for frame in stack {
                if let Some(base) = modules.get(&frame.module_path) {
                    frame.address = frame.address.saturating_sub(*base);
                }
            }
        }
    }
    Ok(events)
}

struct Document {
    module_map: ModuleMap,
    events: Vec<RawEvent>,
}

#[derive(Default)]
struct FrameBuilder {
    location: Option<String>,
    path: Option<String>,
    address: Option<u64>,
}

impl FrameBuilder {
    fn build(self) -> StackFrame {
        StackFrame {
            location: self.location.unwrap_or_else(|| UNSYMBOLICATED.to_string()),
            module_path: self.path.unwrap_or_default(),
            address: self.address.unwrap_or(0),
        }
    }
}

/// Addresses appear both as decimal and as `0x`-prefixed hex.
fn parse_address(raw: &str) -> Option<u64> {
    let trimmed = raw.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        trimmed.parse::<u64>().ok()
    }
}

fn parse_document(text: &str) -> Result<Document, FormatError> {
    let mut reader = Reader::from_reader(text.as_bytes());
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut element_stack: Vec<String> = Vec::new();
    let mut text_buf = String::new();

    let mut module_map: ModuleMap = HashMap::new();
    let mut events: Vec<RawEvent> = Vec::new();

    let mut current_pid: Option<i64> = None;
    let mut current_modules: HashMap<String, u64> = HashMap::new();
    let mut module_path: Option<String> = None;
    let mut module_base: Option<u64> = None;

    let mut current_event: Option<RawEvent> = None;
    let mut current_stack: Option<Vec<StackFrame>> = None;
    let mut current_frame: Option<FrameBuilder> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match name.as_str() {
                    "event" if element_stack.last().map(String::as_str) == Some("eventlist") => {
                        current_event = Some(RawEvent::default());
                    }
                    "stack" if current_event.is_some() => {
                        current_stack = Some(Vec::new());
                    }
                    "frame" if current_stack.is_some() => {
                        current_frame = Some(FrameBuilder::default());
                    }
                    "process" if element_stack.last().map(String::as_str) == Some("processlist") => {
                        current_pid = None;
                        current_modules = HashMap::new();
                    }
                    "module" => {
                        module_path = None;
                        module_base = None;
                    }
                    _ => {}
                }
                element_stack.push(name);
                text_buf.clear();
            }
            Ok(XmlEvent::Empty(empty)) => {
                // Self-closing child: present but empty text content.
                let name = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                handle_closed_element(
                    &name,
                    "",
                    &element_stack,
                    &mut current_pid,
                    &mut module_path,
                    &mut module_base,
                    &mut current_event,
                    &mut current_stack,
                    &mut current_frame,
                );
            }
            Ok(XmlEvent::Text(text)) => {
                text_buf.push_str(&String::from_utf8_lossy(text.as_ref()));
            }
            Ok(XmlEvent::End(_)) => {
                let Some(name) = element_stack.pop() else {
                    return Err(FormatError::Markup("unbalanced closing tag".to_string()));
                };
                let content = std::mem::take(&mut text_buf);
                match name.as_str() {
                    "frame" => {
                        if let (Some(frame), Some(stack)) = (current_frame.take(), current_stack.as_mut()) {
                            stack.push(frame.build());
                        }
                    }
                    "stack" => {
                        if let Some(event) = current_event.as_mut() {
                            event.stack = current_stack.take();
                        }
                    }
                    "event" => {
                        if let Some(event) = current_event.take() {
                            events.push(event);
                        }
                    }
                    "module" => {
                        if let (Some(path), Some(base)) = (module_path.take(), module_base.take()) {
                            current_modules.insert(path, base);
                        }
                    }
                    "process" => {
                        if let Some(pid) = current_pid.take() {
                            module_map.insert(pid, std::mem::take(&mut current_modules));
                        }
                    }
                    _ => {
                        handle_closed_element(
                            &name,
                            &content,
                            &element_stack,
                            &mut current_pid,
                            &mut module_path,
                            &mut module_base,
                            &mut current_event,
                            &mut current_stack,
                            &mut current_frame,
                        );
                    }
                }
            }
            Ok(XmlEvent::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(err.into()),
        }
        buf.clear();
    }

    Ok(Document { module_map, events })
}

/// Dispatch a completed leaf element by its surrounding context.
#[allow(clippy::too_many_arguments)]
fn handle_closed_element(
    name: &str,
    content: &str,
    element_stack: &[String],
    current_pid: &mut Option<i64>,
    module_path: &mut Option<String>,
    module_base: &mut Option<u64>,
    current_event: &mut Option<RawEvent>,
    current_stack: &mut Option<Vec<StackFrame>>,
    current_frame: &mut Option<FrameBuilder>,
) {
    let parent = element_stack.last().map(String::as_str);

    if let Some(frame) = current_frame.as_mut() {
        match name {
            "location" => frame.location = Some(content.to_string()),
            "path" => frame.path = Some(content.to_string()),
            "address" => frame.address = parse_address(content),
            _ => debug!("ignoring frame child element {name:?}"),
        }
        return;
    }

    if current_stack.is_some() {
        return;
    }

    if let Some(event) = current_event.as_mut() {
        if parent == Some("event") {
            event
                .fields
                .insert(name.replace('_', " "), CellValue::coerce(content));
        }
        return;
    }

    match parent {
        Some("process") => {
            if name == "ProcessId" {
                *current_pid = content.trim().parse::<i64>().ok();
            }
        }
        Some("module") => match name {
            "Path" => *module_path = Some(content.to_string()),
            "BaseAddress" => *module_base = parse_address(content),
            _ => {}
        },
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<procmon>
  <processlist>
    <process>
      <ProcessId>100</ProcessId>
      <modulelist>
        <module>
          <Path>C:\bin\xul.dll</Path>
          <BaseAddress>0x1000</BaseAddress>
        </module>
      </modulelist>
    </process>
  </processlist>
  <eventlist>
    <event>
      <PID>100</PID>
      <Operation>ReadFile</Operation>
      <Time_of_Day>10:01:02.5</Time_of_Day>
      <Duration>0.25</Duration>
      <stack>
        <frame>
          <path>C:\bin\xul.dll</path>
          <address>0x1400</address>
        </frame>
        <frame>
          <location>known!symbol</location>
          <path>C:\bin\other.dll</path>
          <address>0x9000</address>
        </frame>
      </stack>
    </event>
  </eventlist>
</procmon>
"#;

    #[test]
    fn test_fields_coerced_and_underscores_replaced() {
        let events = parse(SAMPLE).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.fields["PID"], CellValue::Number(100.0));
        assert_eq!(
            event.fields["Operation"],
            CellValue::Text("ReadFile".to_string())
        );
        assert_eq!(
            event.fields["Time of Day"],
            CellValue::Text("10:01:02.5".to_string())
        );
        assert_eq!(event.fields["Duration"], CellValue::Number(0.25));
    }

    #[test]
    fn test_stack_frames_with_placeholder() {
        let events = parse(SAMPLE).unwrap();
        let stack = events[0].stack.as_ref().unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].location, UNSYMBOLICATED);
        assert_eq!(stack[0].module_path, "C:\\bin\\xul.dll");
        assert_eq!(stack[0].address, 0x1400);
        assert_eq!(stack[1].location, "known!symbol");
    }

    #[test]
    fn test_resolving_variant_subtracts_module_base() {
        let events = parse_resolving(SAMPLE).unwrap();
        let stack = events[0].stack.as_ref().unwrap();
        // xul.dll is in the PID-100 module list with base 0x1000.
        assert_eq!(stack[0].address, 0x400);
        // other.dll is not listed, so its address stays absolute.
        assert_eq!(stack[1].address, 0x9000);
    }

    #[test]
    fn test_empty_location_element_is_present_but_empty() {
        let xml = r#"
<procmon>
  <eventlist>
    <event>
      <PID>1</PID>
      <stack>
        <frame>
          <location/>
          <path>C:\a.dll</path>
          <address>16</address>
        </frame>
      </stack>
    </event>
  </eventlist>
</procmon>
"#;
        let events = parse(xml).unwrap();
        let stack = events[0].stack.as_ref().unwrap();
        assert_eq!(stack[0].location, "");
        assert_eq!(stack[0].address, 16);
    }
}
