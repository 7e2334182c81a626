//! System prompts and prompt builders for the outline and scene agents.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble content changes.
//! The version is recorded in telemetry so a regression in generated scripts
//! can be traced back to the prompt that produced it.

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Fence label the scene agent is told to use.
pub const SOURCE_FENCE_LABEL: &str = "python";

/// Outline agent preamble.
pub const OUTLINE_PREAMBLE: &str = "\
You plan short educational animations. Given a topic, produce a structured outline with \
these sections:

- Topic: the subject being explained.
- Key Points: 3-5 core concepts or steps, in teaching order.
- Visual Elements: concrete Manim objects (shapes, Text, arrows, axes, graphs) that \
  represent each key point.
- Style: a 3Blue1Brown-inspired look with smooth animations, a consistent palette \
  (BLUE, GREEN, WHITE) and clear transitions.

For computer science and math topics (arrays, linked lists, binary search, proofs) include \
data structure visualisations and the relevant time complexity (O(n), O(log n)) as \
annotations or graphs. Reply with the outline only.";

/// Scene coder preamble.
pub const SCENE_CODER_PREAMBLE: &str = "\
You write Manim Community Edition (v0.18) Python scripts that explain a topic visually, \
following a structured outline. The script must be original, syntactically valid and \
render without errors.

## Structure
- Start with `from manim import *`.
- Define exactly one class inheriting from `Scene`, using the class name given in the task.
- Implement `construct(self)` with one section per key point; use helper methods for \
  repeated visuals.

## Layout and pacing
- Keep every object inside the frame (x in -7 to 7, y in -4 to 4) and avoid overlaps.
- Call `self.wait(1)` after key animations.
- Clear the screen with `self.play(FadeOut(*self.mobjects))` only after objects have been \
  added; never fade out an empty scene at the start of `construct`.

## Correctness
- Close every bracket and define every name before use.
- Use only Manim v0.18 APIs (Circle, Square, Rectangle, Text, Arrow, Axes, VGroup, \
  Create, Write, FadeIn, FadeOut, Transform, Indicate).
- Prefer `Text` over `Tex`/`MathTex`; LaTeX may not be installed.
- Do not read or write files.

## Output
Return the complete script in a single ```python fenced block and nothing else.";

/// Chatbot preamble.
pub const CHAT_PREAMBLE: &str = "\
You are a concise, friendly tutor. Answer the user's question clearly, with a short example \
when it helps.";

/// Build the outline request for a topic.
pub fn outline_prompt(topic: &str) -> String {
    format!("Generate a structured outline for the topic: '{topic}'")
}

/// Build the scene-code request.
///
/// With `feedback` present the model is told to repair the previous script's
/// failure instead of starting over.
pub fn scene_prompt(topic: &str, outline: &str, scene_class: &str, feedback: Option<&str>) -> String {
    let mut prompt = format!(
        "Write a Manim script that visually explains '{topic}'.\n\
         The scene class must be named `{scene_class}`.\n\n\
         ## Outline\n\n{outline}\n"
    );

    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str(&format!(
            "\n## Previous Attempt Failed\n\n\
             The last script failed with:\n\n{feedback}\n\n\
             Correct this specific failure in your next script. Keep the parts that worked; \
             do not restart from a different design.\n"
        ));
    }

    prompt
}
