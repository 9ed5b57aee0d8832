//! Backend connectors.
//!
//! Each module supplies a config with defaults, a native handle, and a
//! marker type implementing [`Backend`](crate::connector::Backend).
//!
//! | key              | handle                   | liveness                           |
//! |------------------|--------------------------|------------------------------------|
//! | `clickhouse`     | `clickhouse::Client`s    | `SELECT 1`, hosts tried in order   |
//! | `etcd`           | HTTP client              | quorum over maintenance status     |
//! | `s3`             | `aws_sdk_s3::Client`     | `/minio/health/live`               |
//! | `kafka-producer` | `rskafka` client builder | quorum over broker bootstraps      |
//! | `postgres`       | `sqlx::PgPool`           | `SELECT 1`                         |
//! | `redis`          | `redis::Client`          | `PING` (master resolved by Sentinel) |
//! | `http`           | HTTP client              | health path, status > 400 fails    |
//! | `gitlab`         | HTTP client              | `GET api/v4/users`                 |

pub mod clickhouse;
pub mod etcd;
pub mod gitlab;
pub mod http;
pub mod kafka;
pub mod postgres;
pub mod redis;
pub mod s3;

pub use self::clickhouse::{ClickHouse, ClickHouseConfig};
pub use etcd::{Etcd, EtcdConfig};
pub use gitlab::{GitLab, GitLabConfig};
pub use http::{Http, HttpConfig};
pub use kafka::{Kafka, KafkaConfig};
pub use postgres::{Postgres, PostgresConfig};
pub use self::redis::{Redis, RedisConfig};
pub use s3::{S3Config, S3};
