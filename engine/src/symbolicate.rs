//! Batch symbolication of captured stacks against an external symbol
//! source. The engine prepares deduplicated requests and scatters the
//! responses back; the transport is behind [`SymbolResolver`] so hosts can
//! plug in a server client or a local symbol store.

use indexmap::IndexMap;
use log::warn;
use serde::{Deserialize, Serialize};
use shared::{module_basename, LogEntry};

use crate::profiler::Lib;

/// Upper bound on frames per request, so one enormous stack capture cannot
/// produce an oversized request body.
pub const SYMBOLICATION_CHUNK: usize = 64;

/// One symbolication request: the module table and frame lists indexing
/// into it. Field names follow the symbolication server's wire format.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SymbolicationRequest {
    /// `(debug name, debug id)` per module, e.g. `("xul.pdb", "ABCD12...")`.
    #[serde(rename = "memoryMap")]
    pub memory_map: Vec<(String, String)>,
    /// Frames as `(module index, relative address)`.
    pub stacks: Vec<Vec<(usize, u64)>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResolvedFrame {
    pub function: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SymbolicationResponse {
    pub stacks: Vec<Vec<ResolvedFrame>>,
}

/// Source of symbol names. Implementations are expected to resolve every
/// requested frame, returning the raw address string for unknown ones.
pub trait SymbolResolver {
    fn resolve(
        &self,
        request: &SymbolicationRequest,
    ) -> impl std::future::Future<Output = anyhow::Result<SymbolicationResponse>> + Send;
}

/// Binary-module debug name: `.dll` and `.exe` carry their symbols in a
/// sibling `.pdb`.
fn debug_name(basename: &str) -> String {
    if let Some(stem) = basename.strip_suffix(".dll").or_else(|| basename.strip_suffix(".exe")) {
        format!("{stem}.pdb")
    } else {
        basename.to_string()
    }
}

struct PreparedRequest {
    memory_map: Vec<(String, String)>,
    /// Deduplicated `(module index, address)` frames, in first-seen order.
    frames: Vec<(usize, u64)>,
    /// Frame → index into `frames`.
    frame_slots: IndexMap<(usize, u64), usize>,
    /// Module basename → index into `memory_map`.
    module_slots: IndexMap<String, usize>,
}

/// Collect every unsymbolicated frame whose module appears in the profile's
/// library list, deduplicating both modules and frames.
fn prepare(entries: &[LogEntry], libs: &[Lib]) -> PreparedRequest {
    let mut memory_map: Vec<(String, String)> = Vec::new();
    let mut module_slots: IndexMap<String, usize> = IndexMap::new();
    let mut frames: Vec<(usize, u64)> = Vec::new();
    let mut frame_slots: IndexMap<(usize, u64), usize> = IndexMap::new();

    let libs_by_basename: IndexMap<String, &Lib> = libs
        .iter()
        .map(|lib| (module_basename(&lib.path), lib))
        .collect();

    for entry in entries {
        let Some(stack) = &entry.stack else { continue };
        for frame in stack {
            if frame.is_symbolicated() || frame.module_path.is_empty() {
                continue;
            }
            let basename = module_basename(&frame.module_path);
            let Some(lib) = libs_by_basename.get(&basename) else {
                continue;
            };
            let module_index = *module_slots.entry(basename.clone()).or_insert_with(|| {
                memory_map.push((debug_name(&basename), lib.breakpad_id.clone()));
                memory_map.len() - 1
            });
            let key = (module_index, frame.address);
            if !frame_slots.contains_key(&key) {
                frame_slots.insert(key, frames.len());
                frames.push(key);
            }
        }
    }

    PreparedRequest { memory_map, frames, frame_slots, module_slots }
}

/// Resolve every unsymbolicated frame in `entries` in place.
///
/// Frames are deduplicated and sent as one request whose stacks are chunks
/// of at most [`SYMBOLICATION_CHUNK`] frames; when the request fails every
/// frame keeps its placeholder location, never a partial mix. Module paths
/// are reduced to their basename afterwards, resolved or not.
pub async fn symbolicate_entries<R: SymbolResolver>(
    entries: &mut [LogEntry],
    libs: &[Lib],
    resolver: &R,
) {
    let prepared = prepare(entries, libs);
    let mut resolved: Vec<Option<String>> = vec![None; prepared.frames.len()];

    if !prepared.frames.is_empty() {
        let request = SymbolicationRequest {
            memory_map: prepared.memory_map.clone(),
            stacks: prepared
                .frames
                .chunks(SYMBOLICATION_CHUNK)
                .map(|chunk| chunk.to_vec())
                .collect(),
        };
        match resolver.resolve(&request).await {
            Ok(response) => {
                for (chunk_index, stack) in response.stacks.iter().enumerate() {
                    let base = chunk_index * SYMBOLICATION_CHUNK;
                    for (offset, frame) in stack.iter().enumerate() {
                        if base + offset < resolved.len() {
                            resolved[base + offset] = Some(frame.function.clone());
                        }
                    }
                }
            }
            Err(err) => {
                warn!("symbolication request failed, keeping placeholders: {err:#}");
            }
        }
    }

    for entry in entries {
        let Some(stack) = &mut entry.stack else { continue };
        for frame in stack {
            if frame.module_path.is_empty() {
                continue;
            }
            let basename = module_basename(&frame.module_path);
            if !frame.is_symbolicated() {
                if let Some(&module_index) = prepared.module_slots.get(&basename) {
                    let key = (module_index, frame.address);
                    if let Some(&slot) = prepared.frame_slots.get(&key) {
                        if let Some(function) = &resolved[slot] {
                            frame.location = function.clone();
                        }
                    }
                }
            }
            frame.module_path = basename;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{StackFrame, UNSYMBOLICATED};
    use std::sync::Mutex;

    fn lib(path: &str, id: &str) -> Lib {
        Lib {
            path: path.to_string(),
            debug_name: String::new(),
            breakpad_id: id.to_string(),
        }
    }

    fn entry_with_stack(frames: Vec<StackFrame>) -> LogEntry {
        LogEntry {
            stack: Some(frames),
            ..Default::default()
        }
    }

    /// Answers every frame with `module_index!address`, recording requests.
    struct EchoResolver {
        requests: Mutex<Vec<SymbolicationRequest>>,
    }

    impl EchoResolver {
        fn new() -> Self {
            EchoResolver { requests: Mutex::new(Vec::new()) }
        }
    }

    impl SymbolResolver for EchoResolver {
        async fn resolve(
            &self,
            request: &SymbolicationRequest,
        ) -> anyhow::Result<SymbolicationResponse> {
            self.requests.lock().unwrap().push(request.clone());
            let stacks = request
                .stacks
                .iter()
                .map(|stack| {
                    stack
                        .iter()
                        .map(|(module, address)| ResolvedFrame {
                            function: format!("{module}!{address:#x}"),
                        })
                        .collect()
                })
                .collect();
            Ok(SymbolicationResponse { stacks })
        }
    }

    struct FailingResolver;

    impl SymbolResolver for FailingResolver {
        async fn resolve(
            &self,
            _request: &SymbolicationRequest,
        ) -> anyhow::Result<SymbolicationResponse> {
            anyhow::bail!("symbol server unreachable")
        }
    }

    #[test]
    fn test_debug_name_transform() {
        assert_eq!(debug_name("xul.dll"), "xul.pdb");
        assert_eq!(debug_name("firefox.exe"), "firefox.pdb");
        assert_eq!(debug_name("libxul.so"), "libxul.so");
    }

    #[tokio::test]
    async fn test_resolves_and_reduces_module_paths() {
        let mut entries = vec![entry_with_stack(vec![
            StackFrame::unsymbolicated("C:\\bin\\XUL.dll".to_string(), 0x400),
            StackFrame {
                location: "already!known".to_string(),
                module_path: "C:\\bin\\other.dll".to_string(),
                address: 0x10,
            },
        ])];
        let libs = [lib("C:\\bin\\xul.dll", "XULID"), lib("C:\\bin\\other.dll", "OTHERID")];
        let resolver = EchoResolver::new();
        symbolicate_entries(&mut entries, &libs, &resolver).await;

        let stack = entries[0].stack.as_ref().unwrap();
        assert_eq!(stack[0].location, "0!0x400");
        assert_eq!(stack[0].module_path, "xul.dll");
        // Symbolicated frames are untouched apart from the basename.
        assert_eq!(stack[1].location, "already!known");
        assert_eq!(stack[1].module_path, "other.dll");

        let requests = resolver.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].memory_map, vec![("xul.pdb".to_string(), "XULID".to_string())]);
    }

    #[tokio::test]
    async fn test_duplicate_frames_sent_once() {
        let frame = StackFrame::unsymbolicated("C:\\a.dll".to_string(), 0x20);
        let mut entries = vec![
            entry_with_stack(vec![frame.clone(), frame.clone()]),
            entry_with_stack(vec![frame]),
        ];
        let resolver = EchoResolver::new();
        symbolicate_entries(&mut entries, &[lib("C:\\a.dll", "AID")], &resolver).await;

        let requests = resolver.requests.lock().unwrap();
        assert_eq!(requests[0].stacks[0].len(), 1);
        drop(requests);
        for entry in &entries {
            for frame in entry.stack.as_ref().unwrap() {
                assert_eq!(frame.location, "0!0x20");
            }
        }
    }

    #[tokio::test]
    async fn test_large_frame_sets_are_chunked() {
        let frames: Vec<StackFrame> = (0..150)
            .map(|i| StackFrame::unsymbolicated("C:\\a.dll".to_string(), i))
            .collect();
        let mut entries = vec![entry_with_stack(frames)];
        let resolver = EchoResolver::new();
        symbolicate_entries(&mut entries, &[lib("C:\\a.dll", "AID")], &resolver).await;

        // One round trip, chunked inside the request.
        let requests = resolver.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].stacks.len(), 3);
        assert_eq!(requests[0].stacks[0].len(), SYMBOLICATION_CHUNK);
        assert_eq!(requests[0].stacks[2].len(), 150 - 2 * SYMBOLICATION_CHUNK);
        drop(requests);
        let stack = entries[0].stack.as_ref().unwrap();
        assert_eq!(stack[149].location, "0!0x95");
    }

    #[tokio::test]
    async fn test_failure_never_leaves_partial_resolution() {
        let frames: Vec<StackFrame> = (0..100)
            .map(|i| StackFrame::unsymbolicated("C:\\a.dll".to_string(), i))
            .collect();
        let mut entries = vec![entry_with_stack(frames)];
        symbolicate_entries(&mut entries, &[lib("C:\\a.dll", "AID")], &FailingResolver).await;
        for frame in entries[0].stack.as_ref().unwrap() {
            assert_eq!(frame.location, UNSYMBOLICATED);
            assert_eq!(frame.module_path, "a.dll");
        }
    }

    #[tokio::test]
    async fn test_failure_keeps_placeholders() {
        let mut entries = vec![entry_with_stack(vec![StackFrame::unsymbolicated(
            "C:\\a.dll".to_string(),
            0x30,
        )])];
        symbolicate_entries(&mut entries, &[lib("C:\\a.dll", "AID")], &FailingResolver).await;
        let stack = entries[0].stack.as_ref().unwrap();
        assert_eq!(stack[0].location, UNSYMBOLICATED);
        assert_eq!(stack[0].module_path, "a.dll");
    }

    #[tokio::test]
    async fn test_unknown_modules_not_requested() {
        let mut entries = vec![entry_with_stack(vec![StackFrame::unsymbolicated(
            "C:\\mystery.dll".to_string(),
            0x40,
        )])];
        let resolver = EchoResolver::new();
        symbolicate_entries(&mut entries, &[], &resolver).await;
        assert!(resolver.requests.lock().unwrap().is_empty());
        assert_eq!(entries[0].stack.as_ref().unwrap()[0].location, UNSYMBOLICATED);
    }
}
