use crate::{
    model::Id,
    validate::{FieldErrors, Validate, check_email, check_length, check_phone},
};
use serde::{Deserialize, Serialize};

pub const ROLE_NAME_MAX_LEN: usize = 50;
pub const UNIVERSITY_NAME_MAX_LEN: usize = 60;
pub const FACULTY_NAME_MAX_LEN: usize = 100;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct RoleMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct UniversityMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct FacultyMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Role {
    pub id: Id<RoleMarker>,
    pub name: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct RoleBody {
    pub name: String,
}

impl Validate for RoleBody {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "name", &self.name, 1, ROLE_NAME_MAX_LEN);
        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct University {
    pub id: Id<UniversityMarker>,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub image_url: Option<String>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct CreateUniversity {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl Validate for CreateUniversity {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "name", &self.name, 1, UNIVERSITY_NAME_MAX_LEN);
        check_email(&mut errors, "email", &self.email);
        check_phone(&mut errors, "phone", &self.phone);
        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateUniversity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Validate for UpdateUniversity {
    fn validate(&self) -> Result<(), FieldErrors> {
        if self.name.is_none() && self.email.is_none() && self.phone.is_none() {
            return Err(FieldErrors::single(
                "body",
                "At least one field must be provided.",
            ));
        }

        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            check_length(&mut errors, "name", name, 1, UNIVERSITY_NAME_MAX_LEN);
        }
        if let Some(email) = &self.email {
            check_email(&mut errors, "email", email);
        }
        if let Some(phone) = &self.phone {
            check_phone(&mut errors, "phone", phone);
        }
        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Faculty {
    pub id: Id<FacultyMarker>,
    pub name: String,
    pub university: Id<UniversityMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct CreateFaculty {
    pub name: String,
    pub university: Id<UniversityMarker>,
}

impl Validate for CreateFaculty {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_length(&mut errors, "name", &self.name, 1, FACULTY_NAME_MAX_LEN);
        errors.into_result()
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdateFaculty {
    pub name: Option<String>,
    pub university: Option<Id<UniversityMarker>>,
}

impl Validate for UpdateFaculty {
    fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        match &self.name {
            Some(name) => check_length(&mut errors, "name", name, 1, FACULTY_NAME_MAX_LEN),
            None if self.university.is_none() => {
                errors.add("body", "At least one field must be provided.");
            }
            None => {}
        }
        errors.into_result()
    }
}
