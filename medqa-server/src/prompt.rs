//! Prompt templates for grounded and general answers.

/// Marker that appears only in prompts built from retrieved context.
pub const KNOWLEDGE_BASE_HEADING: &str = "【知识库内容】";

/// Build the prompt sent as the newest user turn.
///
/// With retrieved `context` the model is told to prefer it, cite it, and label
/// any answer drawn from general knowledge. Without context it is told to
/// answer from general knowledge and recommend seeing a doctor.
pub fn build_rag_prompt(user_query: &str, context: &str) -> String {
    if context.is_empty() {
        format!(
            "你是一个专业的医学知识问答助手。请回答用户的问题。

【用户问题】
{user_query}

【回答要求】
1. 回答要准确、专业、易懂
2. 回答要简洁明了，分点列出关键信息
3. 如果涉及医疗建议，提醒用户咨询专业医生

请回答："
        )
    } else {
        format!(
            "你是一个专业的医学知识问答助手。请基于以下知识库内容回答用户的问题。

{KNOWLEDGE_BASE_HEADING}
{context}

【用户问题】
{user_query}

【回答要求】
1. 优先使用知识库中的信息回答
2. 回答要准确、专业、易懂
3. 如果知识库中有相关信息，请在回答末尾注明信息来源
4. 如果知识库中没有相关信息，可以使用你的通用知识回答，但要说明这不是来自知识库
5. 回答要简洁明了，分点列出关键信息

请回答："
        )
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn grounded_prompt_lists_context_before_question() {
        let prompt = build_rag_prompt("高血压注意事项", "[文档1：hypertension.txt]\n低盐饮食");
        let context_at = prompt.find("低盐饮食").unwrap();
        let question_at = prompt.find("高血压注意事项").unwrap();
        assert!(context_at < question_at);
        assert!(prompt.contains("注明信息来源"));
    }

    #[test]
    fn general_prompt_recommends_a_doctor() {
        let prompt = build_rag_prompt("阿司匹林的作用是什么", "");
        assert!(prompt.contains("阿司匹林的作用是什么"));
        assert!(prompt.contains("咨询专业医生"));
    }

    proptest! {
        #[test]
        fn grounded_prompt_embeds_query_and_context(
            query in "[\\p{Han}a-z0-9？ ]{1,40}",
            context in "[\\p{Han}a-z0-9。\n]{1,200}",
        ) {
            let prompt = build_rag_prompt(&query, &context);
            prop_assert!(prompt.contains(&query));
            prop_assert!(prompt.contains(&context));
            prop_assert!(prompt.contains(KNOWLEDGE_BASE_HEADING));
        }

        #[test]
        fn general_prompt_never_mentions_knowledge_base(query in "[a-z0-9？ ]{1,40}") {
            let prompt = build_rag_prompt(&query, "");
            prop_assert!(prompt.contains(&query));
            prop_assert!(!prompt.contains("知识库"));
        }
    }
}
