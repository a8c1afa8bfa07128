//! # medqa-ingest
//!
//! Builds the `medical_knowledge` collection that `medqa-server` answers
//! from. Each run loads every `.txt` file under the data directory, splits
//! it into overlapping chunks, embeds the chunks and replaces the stored
//! collection wholesale, so re-running never duplicates records.
//!
//! ```text
//! medqa-ingest --data-dir ./data --vector-store ./vector_store
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use medqa_rag::{
    DirectoryLoader, DiskVectorStore, EmbeddingBackend, EmbeddingProvider, IngestReport, RagConfig,
    RagPipeline, RecursiveChunker, Retriever, source_filename,
};
use tracing::warn;

/// Characters of chunk text shown in previews.
const PREVIEW_CHARS: usize = 100;

const RULE: &str = "============================================================";

#[derive(Debug, Clone, Parser)]
#[command(name = "medqa-ingest", version, about = "Build the medical knowledge vector collection")]
pub struct IngestArgs {
    /// Directory searched recursively for `.txt` files.
    #[arg(long, env = "MEDQA_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Directory the collection is persisted under.
    #[arg(long, env = "VECTOR_STORE_DIR", default_value = "./vector_store")]
    pub vector_store: PathBuf,

    #[arg(long, env = "COLLECTION_NAME", default_value = "medical_knowledge")]
    pub collection: String,

    /// Maximum chunk length in characters.
    #[arg(long, env = "MEDQA_CHUNK_SIZE", default_value_t = 500)]
    pub chunk_size: usize,

    #[arg(long, env = "MEDQA_CHUNK_OVERLAP", default_value_t = 50)]
    pub chunk_overlap: usize,

    /// `local[:model-id]` or `gemini[:model]`. Must match the server's setting.
    #[arg(long, env = "EMBEDDING_BACKEND", default_value = "local")]
    pub embedding: String,

    /// Required for the `gemini` embedding backend.
    #[arg(long, env = "GOOGLE_AI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Proxy for the `gemini` embedding backend.
    #[arg(long, env = "HTTPS_PROXY")]
    pub proxy: Option<String>,

    /// Query used to sanity-check the new collection.
    #[arg(long, env = "MEDQA_TEST_QUERY", default_value = "高血压患者应该注意什么")]
    pub test_query: String,

    #[arg(long)]
    pub skip_test_query: bool,
}

impl IngestArgs {
    pub fn embedding_backend(&self) -> anyhow::Result<EmbeddingBackend> {
        let api_key = self.api_key.as_deref().filter(|key| !key.trim().is_empty());
        let proxy = self.proxy.clone().filter(|proxy| !proxy.trim().is_empty());
        EmbeddingBackend::parse(&self.embedding, api_key)
            .map(|backend| backend.with_proxy(proxy))
            .with_context(|| format!("invalid embedding backend '{}'", self.embedding))
    }

    pub fn rag_config(&self) -> anyhow::Result<RagConfig> {
        RagConfig::builder()
            .chunk_size(self.chunk_size)
            .chunk_overlap(self.chunk_overlap)
            .build()
            .context("invalid chunking parameters")
    }
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub report: IngestReport,
    /// Hits for the test query; `None` when skipped or failed.
    pub test_hits: Option<usize>,
}

/// Run the full ingestion job with an already-initialised embedding provider.
///
/// # Errors
///
/// Fails when no documents are found, a file is not valid UTF-8, or
/// embedding or storage fails. A failing test query is only reported.
pub async fn run(args: &IngestArgs, provider: Arc<dyn EmbeddingProvider>) -> anyhow::Result<IngestSummary> {
    println!("{RULE}");
    println!("📚 开始加载知识库文档");
    println!("{RULE}");
    println!("📁 数据目录: {}", args.data_dir.display());
    println!("💾 向量库目录: {}", args.vector_store.display());

    println!("\n🔍 步骤1：加载文档...");
    let documents = DirectoryLoader::new(&args.data_dir).load().context("failed to load documents")?;
    println!("✅ 成功加载 {} 个文档", documents.len());
    for (i, doc) in documents.iter().enumerate() {
        println!(
            "   {}. {} ({} 字符)",
            i + 1,
            source_filename(&doc.metadata),
            doc.text.chars().count()
        );
    }

    println!("\n✂️ 步骤2：文档分块...");
    let config = args.rag_config()?;
    let store = DiskVectorStore::open(&args.vector_store)
        .await
        .with_context(|| format!("failed to open vector store at {}", args.vector_store.display()))?;
    let pipeline = RagPipeline::builder()
        .chunker(Arc::new(RecursiveChunker::new(config.chunk_size, config.chunk_overlap)))
        .config(config)
        .embedding_provider(provider.clone())
        .vector_store(Arc::new(store))
        .build()?;

    let preview = pipeline.chunk_documents(&documents);
    println!("✅ 文档已分割为 {} 个块", preview.len());
    if let Some(first) = preview.first() {
        println!("\n📝 示例块（第1块）：");
        println!("来源：{}", first.source_filename());
        println!("内容：{}...", truncate(&first.text));
    }

    println!("\n🔢 步骤3：创建向量嵌入（{}）...", provider.name());
    let report = pipeline
        .rebuild_collection(&args.collection, &documents)
        .await
        .with_context(|| format!("failed to build collection '{}'", args.collection))?;
    println!("✅ 向量数据库创建成功！");
    println!("   - 文档数: {}", report.documents);
    println!("   - 分块数: {}", report.chunks);
    println!("   - 向量维度: {}", report.dimensions);
    println!("   - 存储位置: {}", args.vector_store.display());

    let test_hits = if args.skip_test_query {
        None
    } else {
        test_retrieval(Retriever::new(Arc::new(pipeline), args.collection.clone()), &args.test_query).await
    };

    println!("{RULE}");
    println!("🎉 知识库构建完成！");
    println!("{RULE}");
    println!("\n下一步：运行 medqa-server 启动服务");

    Ok(IngestSummary { report, test_hits })
}

async fn test_retrieval(retriever: Retriever, query: &str) -> Option<usize> {
    println!("\n🧪 步骤4：测试检索功能...");
    println!("测试查询：{query}");
    match retriever.search(query).await {
        Ok(hits) => {
            println!("✅ 检索成功，找到 {} 个相关文档块：\n", hits.len());
            for (i, hit) in hits.iter().enumerate() {
                println!("   {}. 来源：{}", i + 1, hit.chunk.source_filename());
                println!("      内容：{}...\n", truncate(&hit.chunk.text));
            }
            Some(hits.len())
        }
        Err(e) => {
            warn!(error = %e, "test retrieval failed");
            println!("❌ 测试检索失败: {e}");
            None
        }
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
