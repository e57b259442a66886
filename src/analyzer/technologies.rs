//! Catalog of detectable technologies.
//!
//! A technology is detected when any of its packages is a declared dependency
//! or its pattern matches the content of any scanned source file.

use std::sync::LazyLock;

use regex::Regex;

pub struct Technology {
    pub name: &'static str,
    pub packages: &'static [&'static str],
    pub pattern: Regex,
}

fn tech(name: &'static str, packages: &'static [&'static str], pattern: &str) -> Technology {
    Technology {
        name,
        packages,
        pattern: Regex::new(pattern).unwrap(),
    }
}

pub static TECHNOLOGIES: LazyLock<Vec<Technology>> = LazyLock::new(|| {
    vec![
        tech("mastra", &["@mastra/core", "mastra"], r#"from\s+['"]@mastra/"#),
        tech("memory", &["@mastra/memory"], r"new\s+Memory\s*\("),
        tech("rag", &["@mastra/rag"], r#"@mastra/rag|MDocument"#),
        tech(
            "vectorStore",
            &["@mastra/pg", "@mastra/libsql", "@mastra/pinecone", "@mastra/qdrant"],
            r"\b(PgVector|LibSQLVector|PineconeVector|QdrantVector)\b",
        ),
        tech("mcp", &["@mastra/mcp", "@modelcontextprotocol/sdk"], r"\b(MCPClient|MCPServer)\b"),
        tech("evals", &["@mastra/evals"], r"@mastra/evals"),
        tech("voice", &["@mastra/voice-openai", "@mastra/voice-elevenlabs"], r"@mastra/voice"),
        tech("openai", &["openai", "@ai-sdk/openai"], r#"from\s+['"](openai|@ai-sdk/openai)['"]"#),
        tech(
            "anthropic",
            &["@anthropic-ai/sdk", "@ai-sdk/anthropic"],
            r#"from\s+['"](@anthropic-ai/sdk|@ai-sdk/anthropic)['"]"#,
        ),
        tech("google", &["@ai-sdk/google"], r#"from\s+['"]@ai-sdk/google['"]"#),
        tech("aiSdk", &["ai"], r#"from\s+['"]ai['"]"#),
        tech("langchain", &["langchain", "@langchain/core"], r"@langchain/|\blangchain\b"),
        tech("zod", &["zod"], r#"from\s+['"]zod['"]"#),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_names_are_unique() {
        let names: HashSet<&str> = TECHNOLOGIES.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), TECHNOLOGIES.len());
    }

    #[test]
    fn test_patterns_match_typical_imports() {
        let find = |name: &str| TECHNOLOGIES.iter().find(|t| t.name == name).unwrap();
        assert!(find("mastra").pattern.is_match("import { Agent } from '@mastra/core/agent';"));
        assert!(find("zod").pattern.is_match(r#"import { z } from "zod";"#));
        assert!(find("aiSdk").pattern.is_match("import { generateText } from 'ai';"));
        assert!(!find("aiSdk").pattern.is_match("import x from 'ai-utils';"));
    }
}
