use arrow::array::{
    ArrayRef, BooleanArray, StringArray, TimestampMillisecondArray, UInt16Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use poise::serenity_prelude::ChannelId;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::FeatureHandler;
use crate::config::{DumpConfig, GuildTarget};
use crate::error::{BotError, Result};
use crate::guild::{GuildHooks, GuildSnapshot, SnapshotCache};
use crate::models::{ChannelInfo, ChannelKind, HistoryMessage, MemberInfo};
use crate::platform::ChatPlatform;

/// One row of `<channel_id>.parquet`
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub channel_name: String,
    pub channel_id: u64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author_name: String,
    pub author_discriminator: Option<u16>,
    pub author_id: u64,
}

impl HistoryRecord {
    fn project(channel: &ChannelInfo, msg: &HistoryMessage) -> Self {
        Self {
            channel_name: channel.name.clone(),
            channel_id: msg.channel_id.get(),
            content: msg.content.clone(),
            created_at: msg.created_at,
            author_name: msg.author.name.clone(),
            author_discriminator: msg.author.discriminator,
            author_id: msg.author.id.get(),
        }
    }
}

/// One row of `members.parquet`
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub name: String,
    pub discriminator: Option<u16>,
    pub id: u64,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub bot: bool,
}

impl From<&MemberInfo> for MemberRecord {
    fn from(member: &MemberInfo) -> Self {
        Self {
            name: member.name.clone(),
            discriminator: member.discriminator,
            id: member.id.get(),
            joined_at: member.joined_at,
            created_at: member.created_at,
            bot: member.bot,
        }
    }
}

fn utc_millis() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into()))
}

fn strings<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

fn timestamps(values: impl Iterator<Item = Option<DateTime<Utc>>>) -> ArrayRef {
    let millis: Vec<Option<i64>> = values.map(|t| t.map(|t| t.timestamp_millis())).collect();
    Arc::new(TimestampMillisecondArray::from(millis).with_timezone("UTC"))
}

fn history_batch(records: &[HistoryRecord]) -> std::result::Result<RecordBatch, arrow::error::ArrowError> {
    let schema = Schema::new(vec![
        Field::new("channel_name", DataType::Utf8, false),
        Field::new("channel_id", DataType::UInt64, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("created_at", utc_millis(), false),
        Field::new("author_name", DataType::Utf8, false),
        Field::new("author_discriminator", DataType::UInt16, true),
        Field::new("author_id", DataType::UInt64, false),
    ]);

    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            strings(records.iter().map(|r| r.channel_name.as_str())),
            Arc::new(UInt64Array::from_iter_values(records.iter().map(|r| r.channel_id))),
            strings(records.iter().map(|r| r.content.as_str())),
            timestamps(records.iter().map(|r| Some(r.created_at))),
            strings(records.iter().map(|r| r.author_name.as_str())),
            Arc::new(UInt16Array::from(
                records.iter().map(|r| r.author_discriminator).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from_iter_values(records.iter().map(|r| r.author_id))),
        ],
    )
}

fn member_batch(records: &[MemberRecord]) -> std::result::Result<RecordBatch, arrow::error::ArrowError> {
    let schema = Schema::new(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("discriminator", DataType::UInt16, true),
        Field::new("id", DataType::UInt64, false),
        Field::new("joined_at", utc_millis(), true),
        Field::new("created_at", utc_millis(), false),
        Field::new("bot", DataType::Boolean, false),
    ]);

    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            strings(records.iter().map(|r| r.name.as_str())),
            Arc::new(UInt16Array::from(
                records.iter().map(|r| r.discriminator).collect::<Vec<_>>(),
            )),
            Arc::new(UInt64Array::from_iter_values(records.iter().map(|r| r.id))),
            timestamps(records.iter().map(|r| r.joined_at)),
            timestamps(records.iter().map(|r| Some(r.created_at))),
            Arc::new(BooleanArray::from(
                records.iter().map(|r| r.bot).collect::<Vec<_>>(),
            )),
        ],
    )
}

fn encode_error(path: &Path, err: impl std::fmt::Display) -> BotError {
    BotError::DumpEncode {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

/// Encode a batch as parquet and write it through a temp file so a failed
/// run leaves nothing behind
async fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    let mut writer =
        ArrowWriter::try_new(Vec::new(), batch.schema(), None).map_err(|e| encode_error(path, e))?;
    writer.write(batch).map_err(|e| encode_error(path, e))?;
    let bytes = writer.into_inner().map_err(|e| encode_error(path, e))?;

    let dump_error = |e| BotError::DumpWrite {
        path: path.display().to_string(),
        source: e,
    };
    let temp_path = path.with_extension("parquet.tmp");
    tokio::fs::write(&temp_path, &bytes)
        .await
        .map_err(dump_error)?;
    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(dump_error)?;
    Ok(())
}

/// Writes channel history and the member list to local files, then exits
pub struct HistoricalDump {
    cache: SnapshotCache,
    config: DumpConfig,
}

impl HistoricalDump {
    pub fn new(target: GuildTarget, member_limit: u64, config: DumpConfig) -> Self {
        Self {
            cache: SnapshotCache::new(target, member_limit),
            config,
        }
    }

    fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output_dir)
    }

    /// Every configured channel must be a text channel of the guild
    fn dump_targets<'a>(&self, snapshot: &'a GuildSnapshot) -> Result<Vec<&'a ChannelInfo>> {
        self.config
            .channel_ids
            .iter()
            .map(|&id| {
                snapshot
                    .channel(ChannelId::new(id))
                    .filter(|c| c.kind == ChannelKind::Text)
                    .ok_or(BotError::ChannelNotFound { id })
            })
            .collect()
    }

    async fn dump_channel(&self, platform: &dyn ChatPlatform, channel: &ChannelInfo) -> Result<()> {
        let history = platform
            .fetch_history(channel.id, self.config.history_limit)
            .await?;
        let records: Vec<HistoryRecord> = history
            .iter()
            .map(|msg| HistoryRecord::project(channel, msg))
            .collect();

        let path = self.output_dir().join(format!("{}.parquet", channel.id));
        let batch = history_batch(&records).map_err(|e| encode_error(&path, e))?;
        write_parquet(&path, &batch).await?;
        info!(
            "Dumped {} messages from #{} to {}",
            records.len(),
            channel.name,
            path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl GuildHooks for HistoricalDump {
    async fn on_members_post(&self, platform: &dyn ChatPlatform, snapshot: &GuildSnapshot) -> Result<()> {
        let targets = self.dump_targets(snapshot)?;

        let dir = self.output_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| BotError::DumpWrite {
                path: dir.display().to_string(),
                source: e,
            })?;

        let members: Vec<MemberRecord> = snapshot.members.iter().map(MemberRecord::from).collect();
        let path = dir.join("members.parquet");
        let batch = member_batch(&members).map_err(|e| encode_error(&path, e))?;
        write_parquet(&path, &batch).await?;
        info!("Dumped {} members to {}", members.len(), path.display());

        for channel in targets {
            self.dump_channel(platform, channel).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FeatureHandler for HistoricalDump {
    fn name(&self) -> &'static str {
        "dump"
    }

    fn runs_once(&self) -> bool {
        true
    }

    async fn on_connected(&self, platform: &dyn ChatPlatform) -> Result<()> {
        self.cache.refresh(platform, self).await
    }
}
