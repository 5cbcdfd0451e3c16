use crate::metrics::MetricsSnapshot;
use crate::narrative::{NarrativeSet, Weekday};
use crate::style::BrandingSettings;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A client of the monitoring service. Selected once per report session and
/// immutable for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub location: String,
    pub contact_email: String,
    pub branding_defaults: BrandingSettings,
}

/// A seven-day reporting window, normally Monday through Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The Monday–Sunday week containing `date`.
    pub fn week_of(date: NaiveDate) -> Self {
        let monday = date - chrono::Days::new(date.weekday().num_days_from_monday() as u64);
        Self {
            start: monday,
            end: monday + chrono::Days::new(6),
        }
    }

    pub fn days(&self) -> impl Iterator<Item = (Weekday, NaiveDate)> + '_ {
        Weekday::ALL
            .into_iter()
            .enumerate()
            .map(|(idx, day)| (day, self.start + chrono::Days::new(idx as u64)))
    }

    pub fn label(&self) -> String {
        format!(
            "{} \u{2013} {}",
            self.start.format("%b %-d, %Y"),
            self.end.format("%b %-d, %Y")
        )
    }
}

impl Default for DateRange {
    fn default() -> Self {
        Self::week_of(Utc::now().date_naive())
    }
}

/// Evidence file or link attached to a report. Expired attachments are
/// marked inert and excluded from delivered content, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub id: Uuid,
    pub label: String,
    pub reference: String,
    pub expires_at: DateTime<Utc>,
    pub inert: bool,
}

impl MediaAttachment {
    pub fn new(label: impl Into<String>, reference: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            reference: reference.into(),
            expires_at,
            inert: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

/// Typed delivery configuration: enumerated, explicitly defaulted fields
/// instead of an open-ended key bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOptions {
    pub send_email: bool,
    pub send_sms: bool,
    pub email_recipients: Vec<String>,
    pub sms_recipients: Vec<String>,
    pub schedule_delivery: bool,
    pub delivery_date: Option<DateTime<Utc>>,
    pub include_chart: bool,
    pub include_media: bool,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            send_email: true,
            send_sms: false,
            email_recipients: Vec::new(),
            sms_recipients: Vec::new(),
            schedule_delivery: false,
            delivery_date: None,
            include_chart: true,
            include_media: true,
        }
    }
}

impl DeliveryOptions {
    /// Recipients on enabled channels only.
    pub fn active_recipients(&self) -> Vec<(Channel, &str)> {
        let mut out = Vec::new();
        if self.send_email {
            out.extend(
                self.email_recipients
                    .iter()
                    .map(|r| (Channel::Email, r.as_str())),
            );
        }
        if self.send_sms {
            out.extend(
                self.sms_recipients
                    .iter()
                    .map(|r| (Channel::Sms, r.as_str())),
            );
        }
        out
    }

    pub fn has_recipients(&self) -> bool {
        !self.active_recipients().is_empty()
    }
}

/// Report lifecycle. `Scheduled` is the sub-status of a deferred send that
/// has been successfully queued but not yet confirmed by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Draft,
    Review,
    Ready,
    Scheduled,
    Sent,
}

impl ReportStatus {
    /// Forward transitions only; reset-to-draft is handled explicitly by the
    /// workflow and is always allowed.
    pub fn can_advance_to(self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Draft, Review)
                | (Draft, Ready)
                | (Review, Ready)
                | (Ready, Scheduled)
                | (Ready, Sent)
                | (Scheduled, Sent)
        )
    }
}

/// Outcome of one (recipient, channel) dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub recipient: String,
    pub channel: Channel,
    pub success: bool,
    pub detail: Option<String>,
}

mod png_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer
                .serialize_some(&base64::engine::general_purpose::STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(text) => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// The aggregate root: the full working state of one report under
/// construction. Mirrored field-by-field into draft persistence after every
/// observable mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub id: Uuid,
    pub client_id: Option<String>,
    pub date_range: DateRange,
    pub metrics: MetricsSnapshot,
    pub narratives: NarrativeSet,
    pub summary_text: String,
    pub signature: String,
    pub theme: BrandingSettings,
    pub media: Vec<MediaAttachment>,
    pub delivery: DeliveryOptions,
    pub status: ReportStatus,
    #[serde(with = "png_base64", default)]
    pub chart_png: Option<Vec<u8>>,
    pub uploaded_url: Option<String>,
    pub upload_digest: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
}

impl Default for ReportDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportDraft {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: None,
            date_range: DateRange::default(),
            metrics: MetricsSnapshot::default(),
            narratives: NarrativeSet::default(),
            summary_text: String::new(),
            signature: String::new(),
            theme: BrandingSettings::default(),
            media: Vec::new(),
            delivery: DeliveryOptions::default(),
            status: ReportStatus::Draft,
            chart_png: None,
            uploaded_url: None,
            upload_digest: None,
            last_saved_at: None,
        }
    }

    /// Marks expired attachments inert. Returns how many were newly marked.
    pub fn sweep_expired_media(&mut self, now: DateTime<Utc>) -> usize {
        let mut swept = 0;
        for item in &mut self.media {
            if !item.inert && item.is_expired(now) {
                item.inert = true;
                swept += 1;
            }
        }
        swept
    }

    pub fn active_media(&self) -> impl Iterator<Item = &MediaAttachment> {
        self.media.iter().filter(|m| !m.inert)
    }

    /// JSON snapshot for persistence inspection and debugging.
    pub fn snapshot_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_of_normalizes_to_monday() {
        // 2026-08-06 is a Thursday.
        let range = DateRange::week_of(NaiveDate::from_ymd_opt(2026, 8, 6).unwrap());
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2026, 8, 9).unwrap());
        let days: Vec<_> = range.days().collect();
        assert_eq!(days.len(), 7);
        assert_eq!(days[0].0, Weekday::Monday);
        assert_eq!(days[6].0, Weekday::Sunday);
        assert_eq!(days[6].1, range.end);
    }

    #[test]
    fn status_machine_edges() {
        use ReportStatus::*;
        assert!(Draft.can_advance_to(Review));
        assert!(Draft.can_advance_to(Ready));
        assert!(Review.can_advance_to(Ready));
        assert!(Ready.can_advance_to(Sent));
        assert!(Ready.can_advance_to(Scheduled));
        assert!(Scheduled.can_advance_to(Sent));

        assert!(!Draft.can_advance_to(Sent));
        assert!(!Review.can_advance_to(Sent));
        assert!(!Sent.can_advance_to(Ready));
        assert!(!Ready.can_advance_to(Review));
    }

    #[test]
    fn expired_media_is_marked_inert_not_removed() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let mut draft = ReportDraft::new();
        draft.media.push(MediaAttachment::new(
            "clip",
            "https://cdn.example/clip.mp4",
            now - chrono::Duration::hours(1),
        ));
        draft.media.push(MediaAttachment::new(
            "photo",
            "https://cdn.example/photo.jpg",
            now + chrono::Duration::hours(1),
        ));

        assert_eq!(draft.sweep_expired_media(now), 1);
        assert_eq!(draft.media.len(), 2);
        assert_eq!(draft.active_media().count(), 1);
        // A second sweep is a no-op.
        assert_eq!(draft.sweep_expired_media(now), 0);
    }

    #[test]
    fn active_recipients_honor_channel_flags() {
        let mut options = DeliveryOptions::default();
        options.email_recipients.push("ops@acme.test".to_string());
        options.sms_recipients.push("+15550100".to_string());
        // SMS flag off by default.
        assert_eq!(options.active_recipients().len(), 1);
        options.send_sms = true;
        assert_eq!(options.active_recipients().len(), 2);
        options.send_email = false;
        let active = options.active_recipients();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, Channel::Sms);
    }

    #[test]
    fn draft_json_round_trip_including_chart_bytes() {
        let mut draft = ReportDraft::new();
        draft.chart_png = Some(vec![1, 2, 3, 250]);
        draft.summary_text = "Quiet week.".to_string();
        let json = serde_json::to_string(&draft).unwrap();
        let back: ReportDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(back, draft);
    }
}
