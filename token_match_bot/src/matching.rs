use std::sync::Arc;

use teloxide::types::{ChatId, Recipient};

use crate::{
    database::{self, CreateMatchResult, Database, Match, MatchId, Project, ProjectId},
    messenger::Messenger,
    notifications::{
        deliver_to_chat, deliver_to_chat_admins, deliver_with_ladder, templates,
        DeliveryReport, Destination, Logos,
    },
    DELAY_BETWEEN_SENDS,
};

/// What recording a like led to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Only one side likes the other so far.
    Liked,
    /// Both sides like each other, and this is a brand new match.
    Matched(Match),
    /// Both sides like each other, but they were matched before.
    AlreadyMatched(Match),
}

/// Everything needed to announce a match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchAnnouncement {
    pub match_id: MatchId,
    pub project_a: ProjectId,
    pub project_b: ProjectId,
    pub name_a: String,
    pub name_b: String,
    pub logo_a: Option<String>,
    pub logo_b: Option<String>,
}

impl MatchAnnouncement {
    #[must_use]
    pub fn new(the_match: &Match, a: &Project, b: &Project) -> Self {
        Self {
            match_id: the_match.id,
            project_a: a.id,
            project_b: b.id,
            name_a: a.name.clone(),
            name_b: b.name.clone(),
            logo_a: a.logo_file_id.clone(),
            logo_b: b.logo_file_id.clone(),
        }
    }
}

/// What processing a match did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Posts into the projects' groups and channels, and private messages to their
    /// administrators.
    pub announcements: Vec<DeliveryReport>,
    /// Private messages to the projects' registered admins.
    pub direct_messages: Vec<DeliveryReport>,
    /// Whether the match got marked as announced.
    pub announced: bool,
}

/// Turns likes into matches, and matches into notifications.
pub struct MatchPipeline<M> {
    db: Arc<Database>,
    messenger: M,
    notify_community_admins: bool,
}

impl<M: Messenger> MatchPipeline<M> {
    /// With `notify_community_admins`, administrators of the projects' groups and channels
    /// also get the announcement privately.
    pub fn new(db: Arc<Database>, messenger: M, notify_community_admins: bool) -> Self {
        Self {
            db,
            messenger,
            notify_community_admins,
        }
    }

    pub fn messenger(&self) -> &M {
        &self.messenger
    }

    /// Records that `liker` likes `liked`, and creates a match if they like each other.
    ///
    /// Doesn't notify anyone; pass a new match to [`Self::process_match`] for that.
    pub async fn record_like(
        &self,
        liker: ProjectId,
        liked: ProjectId,
    ) -> Result<LikeOutcome, database::Error> {
        self.db.create_like(liker, liked).await?;

        if !self.db.check_mutual_like(liker, liked).await {
            return Ok(LikeOutcome::Liked);
        }

        Ok(match self.db.create_match(liker, liked).await? {
            CreateMatchResult::Created(m) => {
                log::info!("Projects {liker} and {liked} matched as match {}", m.id);
                LikeOutcome::Matched(m)
            }
            CreateMatchResult::AlreadyMatched(m) => LikeOutcome::AlreadyMatched(m),
        })
    }

    /// Gets a project, treating database errors like a missing project.
    async fn load_project(&self, id: ProjectId) -> Option<Project> {
        match self.db.get_project(id).await {
            Ok(Some(project)) => Some(project),
            Ok(None) => {
                log::warn!("Project {id} doesn't exist");
                None
            }
            Err(e) => {
                log::error!("Failed to get project {id}: {e}");
                None
            }
        }
    }

    /// Announces a match in both projects' groups and channels, marks it announced, then tells
    /// every admin of each project about the other one.
    ///
    /// Every notification is attempted on its own, and failures are only logged and reported.
    pub async fn process_match(&self, announcement: &MatchAnnouncement) -> MatchReport {
        let MatchAnnouncement {
            match_id,
            project_a,
            project_b,
            name_a,
            name_b,
            logo_a,
            logo_b,
        } = announcement;
        log::info!("Announcing match {match_id}: {name_a} and {name_b}");

        let a = self.load_project(*project_a).await;
        let b = self.load_project(*project_b).await;
        let the_match = match self.db.get_match(*match_id).await {
            Ok(m) => m,
            Err(e) => {
                log::error!("Failed to get match {match_id}: {e}");
                None
            }
        };

        let mut report = MatchReport::default();

        if let (Some(a), Some(b), Some(the_match)) = (&a, &b, &the_match) {
            let logos_a = Logos::new(logo_a.as_deref(), logo_b.as_deref());
            let logos_b = Logos::new(logo_b.as_deref(), logo_a.as_deref());
            report.announcements = self
                .announce_in_communities(a, b, the_match, logos_a, logos_b)
                .await;
        } else {
            log::error!("Not announcing match {match_id} anywhere, it's missing a part");
        }

        report.announced = match self.db.update_match_announced(*match_id, true).await {
            Ok(m) => m.is_some(),
            Err(e) => {
                log::error!("Failed to mark match {match_id} as announced: {e}");
                false
            }
        };

        if let Some(b) = &b {
            let logos = Logos::new(logo_b.as_deref(), logo_a.as_deref());
            report
                .direct_messages
                .extend(self.notify_admins(*project_a, b, logos).await);
        }
        if let Some(a) = &a {
            let logos = Logos::new(logo_a.as_deref(), logo_b.as_deref());
            report
                .direct_messages
                .extend(self.notify_admins(*project_b, a, logos).await);
        }

        let delivered = report
            .announcements
            .iter()
            .chain(&report.direct_messages)
            .filter(|x| x.outcome.is_delivered())
            .count();
        log::info!(
            "Match {match_id} done: {delivered} of {} notifications delivered",
            report.announcements.len() + report.direct_messages.len()
        );

        report
    }

    /// Posts into A's group and channel, then B's, in that order.
    async fn announce_in_communities(
        &self,
        a: &Project,
        b: &Project,
        the_match: &Match,
        logos_a: Logos<'_>,
        logos_b: Logos<'_>,
    ) -> Vec<DeliveryReport> {
        let text = templates::group_announcement(a, b, the_match);
        let mut reports = Vec::new();

        for (project, logos) in [(a, logos_a), (b, logos_b)] {
            if let Some(reference) = &project.telegram_group {
                let outcome = deliver_to_chat(&self.messenger, reference, &text, logos).await;
                reports.push(DeliveryReport {
                    destination: Destination::Group {
                        project: project.id,
                        reference: reference.clone(),
                    },
                    outcome,
                });
            }
            if let Some(reference) = &project.telegram_channel {
                let outcome = deliver_to_chat(&self.messenger, reference, &text, logos).await;
                reports.push(DeliveryReport {
                    destination: Destination::Channel {
                        project: project.id,
                        reference: reference.clone(),
                    },
                    outcome,
                });
            }
        }

        if self.notify_community_admins {
            let text = templates::community_announcement(a, b, the_match);
            for (project, logos) in [(a, logos_a), (b, logos_b)] {
                let references = [&project.telegram_group, &project.telegram_channel];
                for reference in references.into_iter().flatten() {
                    reports.extend(
                        deliver_to_chat_admins(&self.messenger, reference, &text, logos).await,
                    );
                }
            }
        }

        reports
    }

    /// Tells every admin of `project` about the `other` project.
    async fn notify_admins(
        &self,
        project: ProjectId,
        other: &Project,
        logos: Logos<'_>,
    ) -> Vec<DeliveryReport> {
        let admins = match self.db.get_admins_by_project(project).await {
            Ok(x) => x,
            Err(e) => {
                log::error!("Failed to get admins of project {project}: {e}");
                return Vec::new();
            }
        };
        let other_admins = match self.db.get_admins_by_project(other.id).await {
            Ok(x) => x,
            Err(e) => {
                log::warn!("Failed to get admins of project {}: {e}", other.id);
                Vec::new()
            }
        };

        let text = templates::admin_notification(other, &other_admins);
        let mut reports = Vec::new();

        for admin in admins {
            if !reports.is_empty() {
                tokio::time::sleep(DELAY_BETWEEN_SENDS).await;
            }
            let user = admin.info.user_id;
            let to = Recipient::Id(ChatId::from(user));
            let outcome = deliver_with_ladder(&self.messenger, to, &text, logos).await;
            reports.push(DeliveryReport {
                destination: Destination::Admin { project, user },
                outcome,
            });
        }

        reports
    }

    /// Processes matches that were created but never announced, like when the bot went down
    /// right after creating them.
    pub async fn announce_pending(&self) -> Vec<MatchReport> {
        let pending = match self.db.get_unannounced_matches().await {
            Ok(x) => x,
            Err(e) => {
                log::error!("Failed to get unannounced matches: {e}");
                return Vec::new();
            }
        };

        let mut reports = Vec::new();
        for the_match in pending {
            let (Some(a), Some(b)) = (
                self.load_project(the_match.project_a).await,
                self.load_project(the_match.project_b).await,
            ) else {
                continue;
            };
            let announcement = MatchAnnouncement::new(&the_match, &a, &b);
            reports.push(self.process_match(&announcement).await);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use teloxide::types::UserId;

    use super::*;
    use crate::{
        messenger::ChatRole,
        notifications::{DeliveryOutcome, SkipReason},
        test_support::{new_project, register, FakeMessenger, SentKind},
    };

    async fn pipeline(fake: FakeMessenger) -> MatchPipeline<FakeMessenger> {
        let db = Arc::new(Database::new_in_memory().await.unwrap());
        MatchPipeline::new(db, fake, false)
    }

    async fn matched(pipeline: &MatchPipeline<FakeMessenger>, a: &Project, b: &Project) -> Match {
        assert_eq!(
            pipeline.record_like(a.id, b.id).await.unwrap(),
            LikeOutcome::Liked
        );
        match pipeline.record_like(b.id, a.id).await.unwrap() {
            LikeOutcome::Matched(m) => m,
            other => panic!("Expected a new match, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mutual_like_matches_exactly_once() {
        let pipeline = pipeline(FakeMessenger::new()).await;
        let a = register(&pipeline.db, "Alpha", "0xaaa", &[1, 2]).await;
        let b = register(&pipeline.db, "Beta", "0xbbb", &[3]).await;

        let m = matched(&pipeline, &a, &b).await;
        assert!(!m.announced);

        // Liking again doesn't make another match.
        assert_eq!(
            pipeline.record_like(a.id, b.id).await.unwrap(),
            LikeOutcome::AlreadyMatched(m.clone())
        );
        assert_eq!(pipeline.db.get_matches_by_project(a.id).await.unwrap().len(), 1);

        let report = pipeline
            .process_match(&MatchAnnouncement::new(&m, &a, &b))
            .await;
        assert!(report.announced);
        assert!(pipeline.db.get_match(m.id).await.unwrap().unwrap().announced);
        assert!(report.announcements.is_empty());
        assert_eq!(report.direct_messages.len(), 3);

        let fake = pipeline.messenger();
        for user in ["1", "2"] {
            let sent = fake.sent_to(user);
            assert_eq!(sent.len(), 1, "admin {user} of Alpha");
            assert!(sent[0].text.contains("Beta"));
            assert!(sent[0].text.contains("0xbbb"));
        }
        let sent = fake.sent_to("3");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Alpha"));
        assert!(sent[0].text.contains("0xaaa"));
    }

    #[tokio::test]
    async fn liking_again_finishes_a_half_made_match() {
        let pipeline = pipeline(FakeMessenger::new()).await;
        let a = register(&pipeline.db, "Alpha", "0xaaa", &[1]).await;
        let b = register(&pipeline.db, "Beta", "0xbbb", &[2]).await;

        // Both likes got stored, but creating the match never happened.
        pipeline.db.create_like(a.id, b.id).await.unwrap();
        pipeline.db.create_like(b.id, a.id).await.unwrap();
        assert!(pipeline.db.check_mutual_like(a.id, b.id).await);
        assert!(pipeline.db.get_matches_by_project(a.id).await.unwrap().is_empty());
        assert!(pipeline.announce_pending().await.is_empty());

        let m = match pipeline.record_like(b.id, a.id).await.unwrap() {
            LikeOutcome::Matched(m) => m,
            other => panic!("Expected a new match, got {other:?}"),
        };
        assert_eq!(pipeline.db.get_matches_by_project(a.id).await.unwrap(), vec![m.clone()]);
        assert_eq!(
            pipeline.record_like(a.id, b.id).await.unwrap(),
            LikeOutcome::AlreadyMatched(m)
        );
    }

    #[tokio::test]
    async fn nowhere_to_send_means_nothing_sent() {
        let pipeline = pipeline(FakeMessenger::new()).await;
        let a = register(&pipeline.db, "Alpha", "0xaaa", &[]).await;
        let b = register(&pipeline.db, "Beta", "0xbbb", &[]).await;
        let m = matched(&pipeline, &a, &b).await;

        let report = pipeline
            .process_match(&MatchAnnouncement::new(&m, &a, &b))
            .await;
        assert!(report.announced);
        assert!(report.announcements.is_empty());
        assert!(report.direct_messages.is_empty());
        assert!(pipeline.messenger().sent().is_empty());
    }

    #[tokio::test]
    async fn groups_and_channels_in_order() {
        let fake = FakeMessenger::new()
            .with_role("@alpha_group", ChatRole::Administrator)
            .with_role("@alpha_news", ChatRole::Owner)
            .with_role("@beta_group", ChatRole::Member)
            .failing(SentKind::PhotoPair);
        let pipeline = pipeline(fake).await;

        let mut input = new_project("Alpha", "0xaaa");
        input.telegram_group = Some("https://t.me/alpha_group".to_string());
        input.telegram_channel = Some("@alpha_news".to_string());
        input.logo_file_id = Some("logo-a".to_string());
        let a = pipeline.db.create_project(&input).await.unwrap();

        let mut input = new_project("Beta", "0xbbb");
        input.telegram_group = Some("https://t.me/beta_group".to_string());
        input.telegram_channel = Some("https://t.me/+secret".to_string());
        input.logo_file_id = Some("logo-b".to_string());
        let b = pipeline.db.create_project(&input).await.unwrap();

        let m = matched(&pipeline, &a, &b).await;
        let report = pipeline
            .process_match(&MatchAnnouncement::new(&m, &a, &b))
            .await;

        let destinations: Vec<_> = report
            .announcements
            .iter()
            .map(|x| x.destination.clone())
            .collect();
        assert_eq!(
            destinations,
            vec![
                Destination::Group {
                    project: a.id,
                    reference: "https://t.me/alpha_group".to_string()
                },
                Destination::Channel {
                    project: a.id,
                    reference: "@alpha_news".to_string()
                },
                Destination::Group {
                    project: b.id,
                    reference: "https://t.me/beta_group".to_string()
                },
                Destination::Channel {
                    project: b.id,
                    reference: "https://t.me/+secret".to_string()
                },
            ]
        );

        let outcomes: Vec<_> = report.announcements.iter().map(|x| &x.outcome).collect();
        assert_eq!(outcomes[0], &DeliveryOutcome::FellBackToText);
        assert_eq!(outcomes[1], &DeliveryOutcome::FellBackToText);
        assert_eq!(
            outcomes[2],
            &DeliveryOutcome::Skipped(SkipReason::NotAdmin(ChatRole::Member))
        );
        assert!(matches!(
            outcomes[3],
            DeliveryOutcome::Skipped(SkipReason::NotAddressable(_))
        ));

        let fake = pipeline.messenger();
        assert_eq!(fake.sent_to("@alpha_group").len(), 1);
        assert_eq!(fake.sent_to("@alpha_news").len(), 1);
        assert!(fake.sent_to("@beta_group").is_empty());
        assert!(report.announced);
    }

    #[tokio::test]
    async fn missing_project_only_skips_its_part() {
        let pipeline = pipeline(FakeMessenger::new()).await;
        let a = register(&pipeline.db, "Alpha", "0xaaa", &[1]).await;
        let b = register(&pipeline.db, "Beta", "0xbbb", &[2]).await;
        let m = matched(&pipeline, &a, &b).await;

        // The other side can't be loaded, so there's nothing to announce and nobody to tell.
        let mut announcement = MatchAnnouncement::new(&m, &a, &b);
        announcement.project_b = ProjectId(404);
        let report = pipeline.process_match(&announcement).await;

        assert!(report.announced);
        assert!(report.direct_messages.is_empty());

        announcement.project_b = b.id;
        pipeline.db.delete_project(b.id).await.unwrap();
        let report = pipeline.process_match(&announcement).await;
        assert!(!report.announced);
        assert!(report.direct_messages.is_empty());
        assert!(pipeline.messenger().sent().is_empty());
    }

    #[tokio::test]
    async fn pending_matches_get_announced() {
        let pipeline = pipeline(FakeMessenger::new()).await;
        let a = register(&pipeline.db, "Alpha", "0xaaa", &[1]).await;
        let b = register(&pipeline.db, "Beta", "0xbbb", &[2]).await;
        matched(&pipeline, &a, &b).await;

        let reports = pipeline.announce_pending().await;
        assert_eq!(reports.len(), 1);
        assert!(reports[0].announced);
        assert_eq!(pipeline.messenger().sent_to("1").len(), 1);
        assert_eq!(pipeline.messenger().sent_to("2").len(), 1);

        assert!(pipeline.announce_pending().await.is_empty());
    }

    #[tokio::test]
    async fn community_admins_when_enabled() {
        let fake = FakeMessenger::new()
            .with_role("@alpha_group", ChatRole::Administrator)
            .with_admins("@alpha_group", &[50, 51]);
        let db = Arc::new(Database::new_in_memory().await.unwrap());
        let pipeline = MatchPipeline::new(db, fake, true);

        let mut input = new_project("Alpha", "0xaaa");
        input.telegram_group = Some("@alpha_group".to_string());
        let a = pipeline.db.create_project(&input).await.unwrap();
        let b = register(&pipeline.db, "Beta", "0xbbb", &[]).await;
        let m = matched(&pipeline, &a, &b).await;

        let report = pipeline
            .process_match(&MatchAnnouncement::new(&m, &a, &b))
            .await;
        assert_eq!(report.announcements.len(), 3);
        assert_eq!(
            report.announcements[1].destination,
            Destination::CommunityAdmin {
                reference: "@alpha_group".to_string(),
                user: UserId(50)
            }
        );
        assert!(pipeline.messenger().sent_to("50")[0]
            .text
            .contains("Congratulations to both projects!"));
    }
}
