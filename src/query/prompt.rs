//! Prompt templates for classification, expansion and answer generation

use super::QueryType;
use crate::retrieval::RetrievalHit;

const PERSONA: &str = "你是一位熟悉莆仙方言（莆田话）的语言助手。";

/// Prompt asking the model for exactly one intent label
pub fn classification(query: &str) -> String {
    format!(
        "判断下面的问题属于哪一类，只输出类别名称。\n\n\
         类别：\n\
         - factual：发音、词语、释义等事实\n\
         - example：用法、例句、表达方式\n\
         - comparison：区别、对比、异同\n\
         - context：来历、原因、历史背景\n\n\
         问题：{query}\n\n\
         类别（factual/example/comparison/context 之一）："
    )
}

/// Prompt asking for up to `count` rewrites, one per line
pub fn expansion(query: &str, count: usize) -> String {
    format!(
        "把下面的问题改写成{count}个用于检索的查询。\n\
         要求：保持原意；换用更准确的词或近义词；每个改写换一个角度。\n\n\
         原问题：{query}\n\n\
         每行输出一个查询，不要编号，不要解释："
    )
}

fn instructions(label: QueryType) -> &'static str {
    match label {
        QueryType::Factual => {
            "# 任务\n准确回答关于莆田话发音或词汇的问题。\n\n\
             # 要求\n1. 直接给出答案\n2. 如有可能，标注国际音标\n3. 简洁，不超过100字"
        }
        QueryType::Example => {
            "# 任务\n给出莆田话词语的用法和例句。\n\n\
             # 要求\n1. 先说明基本含义\n2. 给出3到5个例句\n3. 每个例句附普通话对照"
        }
        QueryType::Comparison => {
            "# 任务\n比较莆田话词语之间的区别、异同或关系。\n\n\
             # 要求\n1. 分条说明比较的方面\n2. 指出主要区别与共同点\n3. 用例句说明\n4. 使用列表或表格"
        }
        QueryType::Context => {
            "# 任务\n解释莆田话词语的来历和文化背景。\n\n\
             # 要求\n1. 说明词语的起源\n2. 补充历史或文化背景\n3. 说明与古汉语或其他方言的联系\n4. 约200字"
        }
    }
}

/// Passages numbered `【文档 n】` in their final rank order
pub fn context_block(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|hit| format!("【文档 {}】\n{}", hit.rank(), hit.content()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Answer-generation prompt for the query's intent
pub fn answer(label: QueryType, query: &str, hits: &[RetrievalHit]) -> String {
    format!(
        "{PERSONA}\n\n{}\n\n# 参考资料\n{}\n\n# 问题\n{query}\n\n# 回答\n",
        instructions(label),
        context_block(hits)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Document;
    use crate::retrieval::SourceTag;
    use std::sync::Arc;

    #[test]
    fn test_answer_prompt_contains_numbered_context() {
        let hits = vec![
            RetrievalHit::new(
                Arc::new(Document::new("a", "莆仙话：食，释义：吃饭", 0)),
                0.9,
                1,
                SourceTag::Reranked,
            ),
            RetrievalHit::new(
                Arc::new(Document::new("b", "莆仙话：行，释义：走路", 1)),
                0.4,
                2,
                SourceTag::Reranked,
            ),
        ];

        let prompt = answer(QueryType::Factual, "吃怎么说", &hits);
        assert!(prompt.contains("【文档 1】\n莆仙话：食，释义：吃饭"));
        assert!(prompt.contains("【文档 2】"));
        assert!(prompt.contains("吃怎么说"));
        assert!(prompt.contains("国际音标"));
    }

    #[test]
    fn test_classification_prompt_lists_every_label() {
        let prompt = classification("食和吃有什么区别");
        for label in QueryType::ALL {
            assert!(prompt.contains(label.as_str()));
        }
    }

    #[test]
    fn test_expansion_prompt() {
        assert!(expansion("吃怎么说", 3).contains("3个"));
    }
}
