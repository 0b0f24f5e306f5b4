use crate::providers::adapter::ChunkDelta;

const CODE_FENCE: &str = "```";

/// Why the accumulator stopped taking content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    FinishReason(String),
    /// The answer ended on a closing code fence.
    ClosingFence,
    /// The upstream ended (`[DONE]` or EOF) without either signal.
    EndOfStream,
}

/// Answer and reasoning buffers for one session.
///
/// Both buffers are append-only. Once a completion signal is seen they are
/// frozen and further deltas are ignored.
#[derive(Debug, Default)]
pub struct ContentAccumulator {
    answer: String,
    reasoning: String,
    completion: Option<Completion>,
}

impl ContentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta. Returns the completion signal on the call that
    /// freezes the buffers, `None` otherwise.
    pub fn push(&mut self, delta: &ChunkDelta) -> Option<Completion> {
        if self.is_frozen() {
            return None;
        }

        if let Some(reasoning) = &delta.reasoning {
            self.reasoning.push_str(reasoning);
        }
        if let Some(content) = &delta.content {
            self.answer.push_str(content);
        }

        let completion = if let Some(reason) = &delta.finish_reason {
            Some(Completion::FinishReason(reason.clone()))
        } else if ends_with_closing_fence(&self.answer) {
            Some(Completion::ClosingFence)
        } else {
            None
        };

        self.completion.clone_from(&completion);
        completion
    }

    /// Freeze on end of stream if nothing else did. Returns the signal only
    /// when this call froze the buffers.
    pub fn finish(&mut self) -> Option<Completion> {
        if self.is_frozen() {
            return None;
        }
        self.completion = Some(Completion::EndOfStream);
        self.completion.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.completion.is_some()
    }

    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Combined buffer length in bytes.
    pub fn len(&self) -> usize {
        self.answer.len() + self.reasoning.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// True when the answer ends with a fence that closes a block, i.e. the
/// total fence count is even.
///
/// A fenced block in the middle of an answer also freezes it here, dropping
/// whatever follows. The system prompts ask models not to emit code fences.
fn ends_with_closing_fence(answer: &str) -> bool {
    let trimmed = answer.trim_end();
    if !trimmed.ends_with(CODE_FENCE) {
        return false;
    }
    let fences = trimmed.matches(CODE_FENCE).count();
    fences >= 2 && fences % 2 == 0
}
