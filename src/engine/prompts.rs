use super::task::Task;
use crate::providers::types::{ChatMessage, MessageRole};

pub const ANALYSIS_SYSTEM_PROMPT: &str = "你是一名耐心的学科辅导老师。学生会上传一道做错的题目，请分析错误并给出正确解法。
请严格按以下格式逐项输出，每项以标记开头：
题目内容：<完整的题目文字>
学科：<学科>
题型：<题型或知识点类别>
错误类型：<一个简短的错误类型，例如 概念理解错误、计算错误、审题错误>
错误分析：<为什么会错>
正确解法：<分步骤的正确解答>
难度：<1-5 的数字>
知识点标签：<用顿号分隔的知识点>
不要使用 ``` 代码块，公式和代码请直接写成普通文本。";

pub const REVIEW_SYSTEM_PROMPT: &str = "你是一名严格的学科辅导老师，正在复查学生对一道错题的订正。
请判断订正是否正确，指出仍然存在的问题，并给出标准解法。
请严格按以下格式逐项输出，每项以标记开头：
题目内容：<完整的题目文字>
学科：<学科>
题型：<题型或知识点类别>
错误类型：<订正后仍存在的错误类型；若已完全正确，写 已订正>
错误分析：<复查结论>
正确解法：<分步骤的标准解答>
难度：<1-5 的数字>
知识点标签：<用顿号分隔的知识点>
不要使用 ``` 代码块，公式和代码请直接写成普通文本。";

pub fn system_prompt(task: &Task) -> String {
    let base = if task.flags.review_mode {
        REVIEW_SYSTEM_PROMPT
    } else {
        ANALYSIS_SYSTEM_PROMPT
    };
    match task.subject.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(subject) => format!("{base}\n本题所属学科：{subject}"),
        None => base.to_string(),
    }
}

/// Messages sent upstream: the task's own messages, with a system prompt
/// prepended unless the caller already supplied one.
pub fn prepare_messages(task: &Task) -> Vec<ChatMessage> {
    if task
        .messages
        .first()
        .is_some_and(|m| m.role == MessageRole::System)
    {
        return task.messages.clone();
    }
    let mut messages = Vec::with_capacity(task.messages.len() + 1);
    messages.push(ChatMessage::system(system_prompt(task)));
    messages.extend(task.messages.iter().cloned());
    messages
}
