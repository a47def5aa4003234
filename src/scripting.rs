// ============================================================================
// GenCanvas Scripting — Rhai-based sandboxed automation of a viewport
// ============================================================================
//
// Scripts drive a `ViewportState` through the same commands a host sends:
// set up a container, pick a tool, paint, drag handles, pick an aspect
// preset.  Used by the CLI to run repeatable edits headlessly.

use std::sync::{Arc, Mutex};

use egui::pos2;
use rhai::{AST, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, Scope};

use crate::geometry::ViewportRect;
use crate::handles::Handle;
use crate::mask::BrushSettings;
use crate::viewport::{Command, Tool, ViewportState};

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl ScriptError {
    fn at(message: String, pos: Position) -> Self {
        Self {
            message,
            line: pos.line().filter(|l| *l > 0),
            column: pos.position().filter(|c| *c > 0),
        }
    }

    /// Error explanation with location and a hint where one helps.
    pub fn friendly_message(&self) -> String {
        let raw = &self.message;
        let mut parts = Vec::new();

        match (self.line, self.column) {
            (Some(line), Some(col)) => parts.push(format!("Error on line {}, column {}:", line, col)),
            (Some(line), None) => parts.push(format!("Error on line {}:", line)),
            _ => parts.push("Script error:".to_string()),
        }

        let cleaned = raw.split(" (line ").next().unwrap_or(raw);
        if let Some(fn_desc) = raw.strip_prefix("Function not found: ") {
            let fn_desc = fn_desc.split(" (line ").next().unwrap_or(fn_desc);
            parts.push(format!("  Could not find function: {}", fn_desc.trim()));
            parts.push(String::new());
            parts.push("  Tip: canvas functions are container, tool, brush, press, move_to,".to_string());
            parts.push("  release, stroke, drag_handle, aspect, canvas_size, clear_mask,".to_string());
            parts.push("  reset, revert, canvas_rect, image_rect, natural_width, natural_height.".to_string());
        } else if raw.contains("Variable not found:") {
            parts.push(format!("  {}", cleaned));
            parts.push(String::new());
            parts.push("  Tip: declare variables with 'let' before using them.".to_string());
        } else if raw.contains("Syntax error") || raw.contains("Expected") {
            parts.push(format!("  Syntax error: {}", cleaned));
            parts.push(String::new());
            parts.push("  Tip: check for missing semicolons, brackets, or typos near this line.".to_string());
        } else if raw.contains("Too many operations") {
            parts.push("  Script exceeded the maximum operation limit (50 million ops).".to_string());
            parts.push(String::new());
            parts.push("  Tip: your script may have an infinite loop.".to_string());
        } else {
            parts.push(format!("  {}", cleaned));
        }

        parts.join("\n")
    }
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(line), Some(col)) = (self.line, self.column) {
            write!(f, "Line {}, Col {}: {}", line, col, self.message)
        } else if let Some(line) = self.line {
            write!(f, "Line {}: {}", line, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ScriptError {}

// ============================================================================
// Script context — state shared between the engine and host functions
// ============================================================================

struct ScriptContext {
    state: ViewportState,
    console_output: Vec<String>,
}

type SharedContext = Arc<Mutex<ScriptContext>>;
type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Result of a finished script.
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    pub state: ViewportState,
    pub console_output: Vec<String>,
}

/// Scripts may pass ints or floats wherever a coordinate is expected.
fn num(v: &Dynamic) -> HostResult<f32> {
    if let Ok(f) = v.as_float() {
        return Ok(f as f32);
    }
    v.as_int()
        .map(|i| i as f32)
        .map_err(|t| format!("expected a number, got {}", t).into())
}

fn run(ctx: &SharedContext, cmd: Command) -> HostResult<()> {
    let mut lock = ctx.lock().unwrap_or_else(|e| e.into_inner());
    let next = lock.state.execute(&cmd).map_err(|e| -> Box<EvalAltResult> {
        format!("{}: {}", cmd.name(), e).into()
    })?;
    lock.state = next;
    Ok(())
}

fn rect_map(r: ViewportRect) -> Map {
    let mut m = Map::new();
    m.insert("x".into(), Dynamic::from(r.x as f64));
    m.insert("y".into(), Dynamic::from(r.y as f64));
    m.insert("width".into(), Dynamic::from(r.width as f64));
    m.insert("height".into(), Dynamic::from(r.height as f64));
    m
}

// ============================================================================
// Engine construction with sandbox + API registration
// ============================================================================

fn create_engine(ctx: SharedContext) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(50_000_000);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(1_000);

    register_viewport_api(&mut engine, ctx.clone());
    register_query_api(&mut engine, ctx.clone());
    register_utility_api(&mut engine, ctx);

    engine
}

fn register_viewport_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("container", move |w: Dynamic, h: Dynamic| -> HostResult<()> {
        run(&c, Command::ResizeContainer { width: num(&w)?, height: num(&h)? })
    });

    let c = ctx.clone();
    engine.register_fn("tool", move |name: ImmutableString| -> HostResult<()> {
        let tool = Tool::from_name(&name).ok_or_else(|| format!("unknown tool '{}'", name))?;
        run(&c, Command::SetTool(tool))
    });

    let c = ctx.clone();
    engine.register_fn(
        "brush",
        move |size: Dynamic, opacity: Dynamic, hardness: Dynamic| -> HostResult<()> {
            let brush = BrushSettings {
                size: num(&size)?,
                opacity: num(&opacity)?,
                hardness: num(&hardness)?,
            };
            run(&c, Command::SetBrush(brush))
        },
    );

    let c = ctx.clone();
    engine.register_fn("press", move |x: Dynamic, y: Dynamic| -> HostResult<()> {
        run(&c, Command::PointerDown(pos2(num(&x)?, num(&y)?)))
    });

    let c = ctx.clone();
    engine.register_fn("move_to", move |x: Dynamic, y: Dynamic| -> HostResult<()> {
        run(&c, Command::PointerMove(pos2(num(&x)?, num(&y)?)))
    });

    let c = ctx.clone();
    engine.register_fn("release", move || -> HostResult<()> { run(&c, Command::PointerUp) });

    let c = ctx.clone();
    engine.register_fn(
        "stroke",
        move |x0: Dynamic, y0: Dynamic, x1: Dynamic, y1: Dynamic| -> HostResult<()> {
            let from = pos2(num(&x0)?, num(&y0)?);
            let to = pos2(num(&x1)?, num(&y1)?);
            run(&c, Command::PaintStroke { from, to })
        },
    );

    let c = ctx.clone();
    engine.register_fn(
        "drag_handle",
        move |name: ImmutableString, x: Dynamic, y: Dynamic| -> HostResult<()> {
            let handle = Handle::from_code(&name).ok_or_else(|| format!("unknown handle '{}'", name))?;
            run(&c, Command::DragHandle { handle, to: pos2(num(&x)?, num(&y)?) })
        },
    );

    let c = ctx.clone();
    engine.register_fn("aspect", move |ratio: ImmutableString| -> HostResult<()> {
        run(&c, Command::SetAspectRatio(ratio.to_string()))
    });

    let c = ctx.clone();
    engine.register_fn("canvas_size", move |w: Dynamic, h: Dynamic| -> HostResult<()> {
        run(&c, Command::SetExplicitSize { width: num(&w)?, height: num(&h)? })
    });

    let c = ctx.clone();
    engine.register_fn("clear_mask", move || -> HostResult<()> { run(&c, Command::ClearMask) });

    let c = ctx.clone();
    engine.register_fn("reset", move || -> HostResult<()> { run(&c, Command::Reset) });

    let c = ctx;
    engine.register_fn("revert", move || -> HostResult<()> { run(&c, Command::RevertToOriginal) });
}

fn register_query_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("canvas_rect", move || -> Map {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        rect_map(lock.state.canvas_rect())
    });

    let c = ctx.clone();
    engine.register_fn("image_rect", move || -> Map {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        rect_map(lock.state.image_draw_rect())
    });

    let c = ctx.clone();
    engine.register_fn("natural_width", move || -> i64 {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.state.source().map_or(0, |s| s.natural_width() as i64)
    });

    let c = ctx.clone();
    engine.register_fn("natural_height", move || -> i64 {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.state.source().map_or(0, |s| s.natural_height() as i64)
    });

    let c = ctx;
    engine.register_fn("mask_empty", move || -> bool {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.state.mask().is_empty()
    });
}

fn register_utility_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("print_line", move |msg: ImmutableString| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.console_output.push(msg.to_string());
    });
    // Built-in print goes to the same console.
    let c = ctx;
    engine.on_print(move |msg| {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.console_output.push(msg.to_string());
    });
}

// ============================================================================
// Public execution API
// ============================================================================

/// Compile without running, for early syntax errors.
pub fn compile_script(source: &str) -> Result<AST, ScriptError> {
    let engine = Engine::new();
    engine
        .compile(source)
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))
}

/// Run a compiled script against `state` on the calling thread.
pub fn run_script(ast: &AST, state: ViewportState) -> Result<ScriptOutcome, ScriptError> {
    let ctx = Arc::new(Mutex::new(ScriptContext {
        state,
        console_output: Vec::new(),
    }));
    let engine = create_engine(ctx.clone());
    let mut scope = Scope::new();

    engine
        .run_ast_with_scope(&mut scope, ast)
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))?;

    let lock = ctx.lock().unwrap_or_else(|e| e.into_inner());
    Ok(ScriptOutcome {
        state: lock.state.clone(),
        console_output: lock.console_output.clone(),
    })
}

/// Compile and run `source` against `state` on the calling thread.
pub fn execute_script_sync(source: &str, state: ViewportState) -> Result<ScriptOutcome, ScriptError> {
    let ast = compile_script(source)?;
    run_script(&ast, state)
}
