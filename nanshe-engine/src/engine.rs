//! Process-wide wiring of the engine services.

use std::sync::Arc;

use nanshe_models::ProviderRegistry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::Result;
use crate::atoms::AtomFactory;
use crate::builder::{BuilderRegistry, CapsuleBuilder};
use crate::classifier::TaxonomyClassifier;
use crate::coach::CoachService;
use crate::config::EngineConfig;
use crate::embedding::{EmbeddingService, RemoteEmbedder};
use crate::generator::CapsuleGenerator;
use crate::llm::LlmGateway;
use crate::planner::Planner;
use crate::progress::{BadgeAwarder, LoggingBadgeAwarder, ProgressService};
use crate::store::CozoStore;
use crate::worker::{GenerationQueue, WorkerResult, generation_worker_loop};

/// Every service, sharing one store and one gateway.
#[derive(Clone)]
pub struct Engine {
    pub config: EngineConfig,
    pub store: Arc<CozoStore>,
    pub embeddings: Arc<EmbeddingService>,
    pub llm: Arc<LlmGateway>,
    pub classifier: Arc<TaxonomyClassifier>,
    pub planner: Arc<Planner>,
    pub factory: Arc<AtomFactory>,
    pub builder: Arc<CapsuleBuilder>,
    pub generator: Arc<CapsuleGenerator>,
    pub progress: Arc<ProgressService>,
    pub coach: Arc<CoachService>,
}

impl Engine {
    /// Open the configured store and build every service
    pub async fn open(config: EngineConfig, registry: ProviderRegistry) -> Result<Self> {
        let store = CozoStore::from_config(&config.storage, config.embedding.dimension).await?;
        Ok(Self::with_store(config, registry, Arc::new(store), Arc::new(LoggingBadgeAwarder)))
    }

    /// Build the services over an already opened store
    pub fn with_store(
        config: EngineConfig,
        registry: ProviderRegistry,
        store: Arc<CozoStore>,
        badges: Arc<dyn BadgeAwarder>,
    ) -> Self {
        let mut embeddings = EmbeddingService::new(&config.embedding);
        if config.embedding.use_remote {
            match registry.resolve(&config.embedding.remote_model) {
                Ok((provider, model)) => {
                    info!(model = %model, "Remote embeddings enabled");
                    embeddings = embeddings.with_remote(Arc::new(RemoteEmbedder::new(
                        provider,
                        model,
                        config.embedding.dimension,
                    )));
                }
                Err(e) => warn!(error = %e, "Remote embeddings unavailable, hashing locally"),
            }
        }
        let embeddings = Arc::new(embeddings);
        let llm = Arc::new(LlmGateway::new(registry, store.clone(), &config.llm));

        let classifier = Arc::new(TaxonomyClassifier::new(
            store.clone(),
            embeddings.clone(),
            llm.clone(),
            config.classifier.clone(),
        ));
        let planner = Arc::new(Planner::new(store.clone(), embeddings.clone(), llm.clone()));
        let factory = Arc::new(AtomFactory::new(store.clone(), embeddings.clone(), llm.clone()));
        let builder = Arc::new(CapsuleBuilder::new(
            store.clone(),
            planner.clone(),
            factory.clone(),
            BuilderRegistry::default(),
        ));
        let generator = Arc::new(CapsuleGenerator::new(
            store.clone(),
            classifier.clone(),
            builder.clone(),
            config.xp.clone(),
        ));
        let progress = Arc::new(ProgressService::new(store.clone(), config.xp.clone(), badges));
        let coach = Arc::new(CoachService::new(
            store.clone(),
            embeddings.clone(),
            llm.clone(),
            config.coach.clone(),
        ));

        Self {
            config,
            store,
            embeddings,
            llm,
            classifier,
            planner,
            factory,
            builder,
            generator,
            progress,
            coach,
        }
    }

    /// Start a generation worker on the current runtime
    pub fn spawn_worker(&self, shutdown: CancellationToken) -> (GenerationQueue, JoinHandle<WorkerResult>) {
        let (queue, rx) = GenerationQueue::default_channel();
        let handle = tokio::spawn(generation_worker_loop(rx, self.generator.clone(), shutdown));
        (queue, handle)
    }
}
