use crate::{
    model::{
        Id,
        university::{FacultyMarker, RoleMarker, UniversityMarker},
    },
    validate::{FieldErrors, Validate, check_email, check_length, check_name, check_password, check_phone},
};
use serde::{Deserialize, Serialize};
use time::Date;

pub const CARD_ID_MAX_LEN: usize = 15;
pub const TG_LINK_MAX_LEN: usize = 200;

time::serde::format_description!(date_format, Date, "[year]-[month]-[day]");

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UserMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: Option<String>,
    pub card_id: String,
    #[serde(with = "date_format::option")]
    pub birthday: Option<Date>,
    #[serde(with = "date_format")]
    pub enrolment_year: Date,
    pub tg_link: Option<String>,
    pub role: Id<RoleMarker>,
    pub university: Id<UniversityMarker>,
    pub faculty: Option<Id<FacultyMarker>>,
    pub image_url: Option<String>,
}

impl User {
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

/// Public view of a user used in follower and voter listings.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct UserSummary {
    pub id: Id<UserMarker>,
    pub name: String,
    pub surname: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
pub struct CreateUser {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub card_id: String,
    #[serde(default, with = "date_format::option")]
    pub birthday: Option<Date>,
    #[serde(with = "date_format")]
    pub enrolment_year: Date,
    #[serde(default)]
    pub tg_link: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Id<RoleMarker>,
    pub university: Id<UniversityMarker>,
    #[serde(default)]
    pub faculty: Option<Id<FacultyMarker>>,
}

impl Validate for CreateUser {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();

        check_name(&mut errors, "name", &self.name);
        check_name(&mut errors, "surname", &self.surname);
        check_email(&mut errors, "email", &self.email);
        check_password(&mut errors, "password", &self.password);
        check_length(&mut errors, "card_id", &self.card_id, 1, CARD_ID_MAX_LEN);
        if let Some(tg_link) = &self.tg_link {
            check_length(&mut errors, "tg_link", tg_link, 1, TG_LINK_MAX_LEN);
        }
        if let Some(phone) = &self.phone {
            check_phone(&mut errors, "phone", phone);
        }

        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub card_id: Option<String>,
    #[serde(with = "date_format::option")]
    pub birthday: Option<Date>,
    #[serde(with = "date_format::option")]
    pub enrolment_year: Option<Date>,
    pub tg_link: Option<String>,
    pub phone: Option<String>,
    pub role: Option<Id<RoleMarker>>,
    pub university: Option<Id<UniversityMarker>>,
    pub faculty: Option<Id<FacultyMarker>>,
}

impl UpdateUser {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.surname.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.card_id.is_none()
            && self.birthday.is_none()
            && self.enrolment_year.is_none()
            && self.tg_link.is_none()
            && self.phone.is_none()
            && self.role.is_none()
            && self.university.is_none()
            && self.faculty.is_none()
    }
}

impl Validate for UpdateUser {
    fn validate(&self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            return Err(FieldErrors::single(
                "body",
                "At least one field must be provided.",
            ));
        }

        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            check_name(&mut errors, "name", name);
        }
        if let Some(surname) = &self.surname {
            check_name(&mut errors, "surname", surname);
        }
        if let Some(email) = &self.email {
            check_email(&mut errors, "email", email);
        }
        if let Some(password) = &self.password {
            check_password(&mut errors, "password", password);
        }
        if let Some(card_id) = &self.card_id {
            check_length(&mut errors, "card_id", card_id, 1, CARD_ID_MAX_LEN);
        }
        if let Some(tg_link) = &self.tg_link {
            check_length(&mut errors, "tg_link", tg_link, 1, TG_LINK_MAX_LEN);
        }
        if let Some(phone) = &self.phone {
            check_phone(&mut errors, "phone", phone);
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        model::user::{CreateUser, UpdateUser},
        validate::Validate,
    };
    use serde_json::json;

    fn registration() -> serde_json::Value {
        json!({
            "name": "Olena",
            "surname": "Kovalenko",
            "email": "olena@uni.example.org",
            "password": "Str0ng!Pass",
            "card_id": "KB-1042",
            "birthday": "2002-04-17",
            "enrolment_year": "2020-09-01",
            "phone": "+380501234567",
            "role": 1,
            "university": 1,
            "faculty": 2
        })
    }

    #[test]
    fn valid_registration() {
        let user: CreateUser = serde_json::from_value(registration()).unwrap();
        assert!(user.validate().is_ok());
        assert_eq!(user.birthday.unwrap().to_string(), "2002-04-17");
    }

    #[test]
    fn registration_collects_all_field_errors() {
        let mut body = registration();
        body["email"] = json!("not-an-email");
        body["password"] = json!("weak");
        body["phone"] = json!("12345");
        body["card_id"] = json!("");

        let user: CreateUser = serde_json::from_value(body).unwrap();
        let errors = user.validate().unwrap_err();
        for field in ["email", "password", "phone", "card_id"] {
            assert!(errors.get(field).is_some(), "{field} should be reported");
        }
        assert!(errors.get("name").is_none());
    }

    #[test]
    fn optional_registration_fields_default() {
        let mut body = registration();
        let object = body.as_object_mut().unwrap();
        object.remove("birthday");
        object.remove("phone");
        object.remove("faculty");

        let user: CreateUser = serde_json::from_value(body).unwrap();
        assert!(user.birthday.is_none() && user.phone.is_none() && user.faculty.is_none());
        assert!(user.validate().is_ok());
    }

    #[test]
    fn empty_update_is_rejected() {
        let update: UpdateUser = serde_json::from_value(json!({})).unwrap();
        assert!(update.validate().unwrap_err().get("body").is_some());

        let update: UpdateUser = serde_json::from_value(json!({"surname": "Shevchenko"})).unwrap();
        assert!(update.validate().is_ok());
    }
}
