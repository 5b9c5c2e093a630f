use clap::{Parser, Subcommand, ValueEnum};
use cosmos_search_core::{
    ContainerNames, CosmosSettings, EmbeddingSettings, IndexSelection, SearchMode, SearchSettings,
    DEFAULT_DATABASE, DEFAULT_EMBEDDING_API_VERSION, DEFAULT_EMBEDDING_DEPLOYMENT,
    DEFAULT_EMBEDDING_DIMENSIONS,
};

#[derive(Parser)]
#[command(name = "cosmos-search", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Cosmos DB account endpoint
    #[arg(long, env = "AZURE_COSMOSDB_ENDPOINT")]
    pub cosmos_endpoint: String,

    /// Cosmos DB account master key
    #[arg(long, env = "AZURE_COSMOSDB_KEY", hide_env_values = true)]
    pub cosmos_key: String,

    /// Database holding the paper containers
    #[arg(long, env = "AZURE_COSMOSDB_DATABASE", default_value = DEFAULT_DATABASE)]
    pub database: String,

    /// Container without vector or full-text indexes
    #[arg(long, default_value = "search")]
    pub container: String,

    /// Container with a quantizedFlat vector index
    #[arg(long, default_value = "search_qflat")]
    pub qflat_container: String,

    /// Container with a DiskANN vector index
    #[arg(long, default_value = "search_diskann")]
    pub diskann_container: String,

    /// Azure OpenAI endpoint
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    pub openai_endpoint: String,

    /// Azure OpenAI API key
    #[arg(long, env = "AZURE_OPENAI_APIKEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// Azure OpenAI REST API version
    #[arg(long, env = "AZURE_OPENAI_API_VERSION", default_value = DEFAULT_EMBEDDING_API_VERSION)]
    pub openai_api_version: String,

    /// Embedding model deployment name
    #[arg(long, env = "AZURE_OPENAI_EMBEDDING_DEPLOYMENT", default_value = DEFAULT_EMBEDDING_DEPLOYMENT)]
    pub embedding_deployment: String,

    /// Dimensionality of the stored embeddings
    #[arg(long, env = "AZURE_OPENAI_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    pub embedding_dimensions: usize,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run a single search and print the result.
    Search {
        /// Search type
        #[arg(long, value_enum, default_value = "vector")]
        mode: ModeArg,
        /// Container to query, by vector index type.
        #[arg(long, value_enum, default_value = "no-index")]
        index: IndexArg,
        /// Free-text query
        #[arg(long)]
        text: String,
    },
    /// Keep a session open and read searches from stdin.
    Interactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Vector,
    FullTextAll,
    FullTextAny,
    FullTextRank,
    Hybrid,
}

impl From<ModeArg> for SearchMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Vector => SearchMode::Vector,
            ModeArg::FullTextAll => SearchMode::FullTextAll,
            ModeArg::FullTextAny => SearchMode::FullTextAny,
            ModeArg::FullTextRank => SearchMode::FullTextRank,
            ModeArg::Hybrid => SearchMode::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexArg {
    NoIndex,
    #[value(name = "qflat")]
    QuantizedFlat,
    #[value(name = "diskann")]
    DiskAnn,
}

impl From<IndexArg> for IndexSelection {
    fn from(value: IndexArg) -> Self {
        match value {
            IndexArg::NoIndex => IndexSelection::NoIndex,
            IndexArg::QuantizedFlat => IndexSelection::QuantizedFlat,
            IndexArg::DiskAnn => IndexSelection::DiskAnn,
        }
    }
}

impl Cli {
    pub fn settings(&self) -> SearchSettings {
        SearchSettings {
            cosmos: CosmosSettings {
                endpoint: self.cosmos_endpoint.clone(),
                key: self.cosmos_key.clone(),
                database: self.database.clone(),
                containers: ContainerNames {
                    no_index: self.container.clone(),
                    qflat: self.qflat_container.clone(),
                    diskann: self.diskann_container.clone(),
                },
            },
            embedding: EmbeddingSettings {
                endpoint: self.openai_endpoint.clone(),
                api_key: self.openai_api_key.clone(),
                api_version: self.openai_api_version.clone(),
                deployment: self.embedding_deployment.clone(),
                dimensions: self.embedding_dimensions,
            },
        }
    }
}
