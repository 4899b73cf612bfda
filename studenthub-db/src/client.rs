use sqlx::{PgPool, error::ErrorKind, migrate::MigrateError, postgres::PgPoolOptions};
use studenthub_common::model::{
    ModelValidationError, chat::ChatError, comment::CommentError, follow::FollowError,
    post::VoteError,
};
use thiserror::Error;
use tracing::info;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A value that has to be unique is already taken ({constraint})")]
    Conflict { constraint: String },
    #[error("A referenced object does not exist ({constraint})")]
    MissingReference { constraint: String },
    #[error(transparent)]
    Vote(#[from] VoteError),
    #[error(transparent)]
    Follow(#[from] FollowError),
    #[error(transparent)]
    Comment(#[from] CommentError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] MigrateError),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(database_error) = &err {
            let constraint = database_error.constraint().unwrap_or_default().to_owned();
            match database_error.kind() {
                ErrorKind::UniqueViolation => return Self::Conflict { constraint },
                ErrorKind::ForeignKeyViolation => return Self::MissingReference { constraint },
                _ => {}
            }
        }

        Self::Sqlx(err)
    }
}

#[derive(Clone, Debug)]
pub struct DbClient {
    pub(crate) pool: PgPool,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }

    /// Creates a client that only opens connections once a query needs one.
    pub fn connect_lazy(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().connect_lazy(url)?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}
