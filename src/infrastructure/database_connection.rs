// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Product rows reference videos; cascades need foreign keys on
        // for every connection in the pool.
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_videos_sql = r#"
            CREATE TABLE IF NOT EXISTS youtube_videos (
                video_id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                channel_name TEXT NOT NULL DEFAULT '',
                subscriber_count INTEGER NOT NULL DEFAULT 0,
                view_count INTEGER NOT NULL DEFAULT 0,
                upload_date DATE,
                extracted_date DATE NOT NULL,
                video_url TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                product_count INTEGER NOT NULL DEFAULT 0,
                source_url TEXT NOT NULL DEFAULT '',
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
        "#;

        let create_products_sql = r#"
            CREATE TABLE IF NOT EXISTS youtube_products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                video_id TEXT NOT NULL,
                product_name TEXT NOT NULL,
                price INTEGER NOT NULL DEFAULT 0,
                image_url TEXT,
                merchant_name TEXT,
                merchant_link TEXT,
                UNIQUE (video_id, product_name),
                FOREIGN KEY (video_id) REFERENCES youtube_videos (video_id) ON DELETE CASCADE
            )
        "#;

        let index_statements = [
            "CREATE INDEX IF NOT EXISTS idx_videos_extracted_date ON youtube_videos (extracted_date)",
            "CREATE INDEX IF NOT EXISTS idx_videos_source_url ON youtube_videos (source_url)",
            "CREATE INDEX IF NOT EXISTS idx_products_video_id ON youtube_products (video_id)",
        ];

        sqlx::query(create_videos_sql).execute(&self.pool).await?;
        sqlx::query(create_products_sql).execute(&self.pool).await?;
        for statement in index_statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }
}
