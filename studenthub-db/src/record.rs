use sqlx::FromRow;
use studenthub_common::model::{
    ModelValidationError,
    auth::{Credentials, PasswordDigest},
    chat::{ChatRoom, MemberKey, Message},
    comment::Comment,
    file::File,
    notification::Notification,
    post::Post,
    university::{Faculty, Role, University},
    user::{User, UserSummary},
};
use time::{Date, OffsetDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_id: i64,
    pub user_name: String,
    pub user_surname: String,
    pub user_email: String,
    pub user_phone: Option<String>,
    pub user_card_id: String,
    pub user_birthday: Option<Date>,
    pub user_enrolment_year: Date,
    pub user_tg_link: Option<String>,
    pub role_id: i64,
    pub university_id: i64,
    pub faculty_id: Option<i64>,
    pub image_url: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserSummaryRecord {
    pub user_id: i64,
    pub user_name: String,
    pub user_surname: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    pub user_id: i64,
    pub user_password: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct RoleRecord {
    pub role_id: i64,
    pub role_name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UniversityRecord {
    pub university_id: i64,
    pub university_name: String,
    pub university_email: String,
    pub university_phone: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FacultyRecord {
    pub faculty_id: i64,
    pub faculty_name: String,
    pub university_id: i64,
}

#[derive(Clone, PartialEq, Debug, FromRow)]
pub(crate) struct PostRecord {
    pub post_id: i64,
    pub post_heading: String,
    pub post_text: String,
    pub post_author: i64,
    pub post_likes_count: i64,
    pub post_dislikes_count: i64,
    pub post_rating: f64,
    pub post_created_at: OffsetDateTime,
    pub post_modified_at: Option<OffsetDateTime>,
    pub image_url: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct FileRecord {
    pub file_id: i64,
    pub file_name: String,
    pub file_url: String,
    pub file_format: String,
    pub owner_post: Option<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CommentRecord {
    pub comment_id: i64,
    pub comment_text: String,
    pub comment_author: i64,
    pub comment_post: i64,
    pub comment_parent: Option<i64>,
    pub comment_created_at: OffsetDateTime,
    pub comment_modified_at: Option<OffsetDateTime>,
    pub image_url: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct ChatRoomRecord {
    pub chatroom_id: i64,
    pub chatroom_member_key: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct MessageRecord {
    pub message_id: i64,
    pub message_text: String,
    pub message_sender: i64,
    pub message_receiver: i64,
    pub message_chatroom: i64,
    pub message_is_read: bool,
    pub message_created_at: OffsetDateTime,
    pub message_edited_at: Option<OffsetDateTime>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct NotificationRecord {
    pub notification_id: i64,
    pub notification_text: String,
    pub notification_receiver: i64,
    pub notification_is_seen: bool,
    pub notification_link: Option<String>,
    pub notification_created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct NoticeRecord {
    #[sqlx(flatten)]
    pub notification: NotificationRecord,
    pub user_email: String,
}

impl From<UserRecord> for User {
    fn from(value: UserRecord) -> Self {
        Self {
            id: value.user_id.into(),
            name: value.user_name,
            surname: value.user_surname,
            email: value.user_email,
            phone: value.user_phone,
            card_id: value.user_card_id,
            birthday: value.user_birthday,
            enrolment_year: value.user_enrolment_year,
            tg_link: value.user_tg_link,
            role: value.role_id.into(),
            university: value.university_id.into(),
            faculty: value.faculty_id.map(Into::into),
            image_url: value.image_url,
        }
    }
}

impl From<UserSummaryRecord> for UserSummary {
    fn from(value: UserSummaryRecord) -> Self {
        Self {
            id: value.user_id.into(),
            name: value.user_name,
            surname: value.user_surname,
            image_url: value.image_url,
        }
    }
}

impl From<CredentialsRecord> for Credentials {
    fn from(value: CredentialsRecord) -> Self {
        Self {
            user: value.user_id.into(),
            password: PasswordDigest::from_stored(value.user_password),
        }
    }
}

impl From<RoleRecord> for Role {
    fn from(value: RoleRecord) -> Self {
        Self {
            id: value.role_id.into(),
            name: value.role_name,
        }
    }
}

impl From<UniversityRecord> for University {
    fn from(value: UniversityRecord) -> Self {
        Self {
            id: value.university_id.into(),
            name: value.university_name,
            email: value.university_email,
            phone: value.university_phone,
            image_url: value.image_url,
        }
    }
}

impl From<FacultyRecord> for Faculty {
    fn from(value: FacultyRecord) -> Self {
        Self {
            id: value.faculty_id.into(),
            name: value.faculty_name,
            university: value.university_id.into(),
        }
    }
}

impl PostRecord {
    pub fn into_post(self, files: Vec<File>) -> Post {
        Post {
            id: self.post_id.into(),
            heading: self.post_heading,
            text: self.post_text,
            author: self.post_author.into(),
            image_url: self.image_url,
            files,
            likes: self.post_likes_count,
            dislikes: self.post_dislikes_count,
            rating: self.post_rating,
            created_at: self.post_created_at,
            modified_at: self.post_modified_at,
        }
    }
}

impl From<FileRecord> for File {
    fn from(value: FileRecord) -> Self {
        Self {
            id: value.file_id.into(),
            name: value.file_name,
            url: value.file_url,
            format: value.file_format,
        }
    }
}

impl From<CommentRecord> for Comment {
    fn from(value: CommentRecord) -> Self {
        Self {
            id: value.comment_id.into(),
            text: value.comment_text,
            author: value.comment_author.into(),
            post: value.comment_post.into(),
            parent: value.comment_parent.map(Into::into),
            image_url: value.image_url,
            created_at: value.comment_created_at,
            modified_at: value.comment_modified_at,
        }
    }
}

impl TryFrom<ChatRoomRecord> for ChatRoom {
    type Error = ModelValidationError;

    fn try_from(value: ChatRoomRecord) -> Result<Self, Self::Error> {
        let key: MemberKey = value.chatroom_member_key.parse()?;

        Ok(Self {
            id: value.chatroom_id.into(),
            members: key.members(),
        })
    }
}

impl From<MessageRecord> for Message {
    fn from(value: MessageRecord) -> Self {
        Self {
            id: value.message_id.into(),
            text: value.message_text,
            sender: value.message_sender.into(),
            receiver: value.message_receiver.into(),
            room: value.message_chatroom.into(),
            is_read: value.message_is_read,
            created_at: value.message_created_at,
            edited_at: value.message_edited_at,
        }
    }
}

impl From<NotificationRecord> for Notification {
    fn from(value: NotificationRecord) -> Self {
        Self {
            id: value.notification_id.into(),
            text: value.notification_text,
            receiver: value.notification_receiver.into(),
            is_seen: value.notification_is_seen,
            link: value.notification_link,
            created_at: value.notification_created_at,
        }
    }
}
