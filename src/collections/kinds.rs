use crate::core::{DataType, FieldDef, ForeignKey, Result};
use crate::storage::{EntityCatalog, TableSchema};

pub const PERSON: &str = "person";
pub const ORGANIZATION: &str = "organization";
pub const INSTALL: &str = "install";

pub const PHONE_TYPE: &str = "phone_type";
pub const PHONE_NUMBER: &str = "phone_number";
pub const ADDRESS: &str = "address";
pub const EMAIL_ADDRESS: &str = "email_address";

pub const INSTALL_KEY_CONTACT: &str = "install_key_contact";
pub const INSTALL_DATABASE_GROUP: &str = "install_database_group";
pub const INSTALL_SERVER: &str = "install_server";
pub const INSTALL_EQUIPMENT_TYPE: &str = "install_equipment_type";
pub const INSTALL_EQUIPMENT: &str = "install_equipment";
pub const INSTALL_INTERFACE: &str = "install_interface";
pub const INSTALL_INTERFACES_CONTACT: &str = "install_interfaces_contact";
pub const INSTALL_CONTACT: &str = "install_contact";
pub const INSTALL_MODULE: &str = "install_module";
pub const INSTALLS_INSTALL_MODULE: &str = "installs_install_module";

pub const SERVER_TEXT_FIELDS: [&str; 17] = [
    "alias",
    "role",
    "model",
    "location",
    "drac_ip",
    "internal_ip",
    "external_ip",
    "mac_address",
    "dns1",
    "dns2",
    "gateway",
    "subnet_mask",
    "daemons",
    "express_service_code",
    "service_tag",
    "hardware",
    "information",
];

fn text(name: &str) -> FieldDef {
    FieldDef::new(name, DataType::Text)
}

fn reference(name: &str, kind: &str) -> FieldDef {
    FieldDef::new(name, DataType::Ref(kind.to_string()))
}

/// Entity kinds of the CRM and how their collections hang off parents.
pub fn cura_catalog() -> Result<EntityCatalog> {
    let mut server_fields = vec![
        text("server_name").not_null(),
        reference("install_database_group", INSTALL_DATABASE_GROUP),
        text("monitor_link"),
        reference("install", INSTALL),
    ];
    server_fields.extend(SERVER_TEXT_FIELDS.iter().map(|name| text(name)));

    EntityCatalog::new()
        .with_table(TableSchema::new(
            PERSON,
            vec![
                text("first_name"),
                text("last_name"),
                reference("organization", ORGANIZATION),
            ],
        ))?
        .with_table(TableSchema::new(ORGANIZATION, vec![text("name").not_null()]))?
        .with_table(TableSchema::new(
            INSTALL,
            vec![text("name"), reference("organization", ORGANIZATION)],
        ))?
        .with_table(TableSchema::new(PHONE_TYPE, vec![text("type").not_null()]))?
        .with_table(TableSchema::new(
            PHONE_NUMBER,
            vec![
                text("number").not_null(),
                reference("type", PHONE_TYPE).not_null(),
                reference("organization", ORGANIZATION),
                reference("person", PERSON),
            ],
        ))?
        .with_table(TableSchema::new(
            ADDRESS,
            vec![
                text("address"),
                text("city"),
                text("state_province"),
                text("zip"),
                reference("organization", ORGANIZATION),
                reference("person", PERSON),
            ],
        ))?
        .with_table(TableSchema::new(
            EMAIL_ADDRESS,
            vec![
                text("email").not_null(),
                FieldDef::new("is_primary", DataType::Boolean),
                reference("organization", ORGANIZATION),
                reference("person", PERSON),
            ],
        ))?
        .with_table(TableSchema::new(
            INSTALL_KEY_CONTACT,
            vec![
                reference("person", PERSON).not_null(),
                reference("install", INSTALL),
            ],
        ))?
        .with_table(TableSchema::new(
            INSTALL_DATABASE_GROUP,
            vec![text("name").not_null()],
        ))?
        .with_table(TableSchema::new(INSTALL_SERVER, server_fields).with_edit_key(&["server_name"]))?
        .with_table(TableSchema::new(
            INSTALL_EQUIPMENT_TYPE,
            vec![text("type").not_null()],
        ))?
        .with_table(
            TableSchema::new(
                INSTALL_EQUIPMENT,
                vec![
                    text("name").not_null(),
                    text("model_number"),
                    FieldDef::new("quantity", DataType::Integer),
                    reference("item_type", INSTALL_EQUIPMENT_TYPE).not_null(),
                    text("location"),
                    text("information"),
                    reference("install", INSTALL),
                ],
            )
            .with_edit_key(&["name"]),
        )?
        .with_table(
            TableSchema::new(
                INSTALL_INTERFACE,
                vec![
                    text("name").not_null(),
                    text("username"),
                    text("password"),
                    text("url"),
                    text("wiki_link"),
                    text("description"),
                    text("information"),
                    reference("install", INSTALL),
                ],
            )
            .with_edit_key(&["name"]),
        )?
        .with_table(
            TableSchema::new(
                INSTALL_INTERFACES_CONTACT,
                vec![
                    reference("contact", PERSON).not_null(),
                    reference("install_interface", INSTALL_INTERFACE),
                ],
            )
            .with_edit_key(&["contact"]),
        )?
        .with_table(TableSchema::new(
            INSTALL_CONTACT,
            vec![
                reference("person", PERSON).not_null(),
                reference("install", INSTALL),
            ],
        ))?
        .with_table(TableSchema::new(INSTALL_MODULE, vec![text("name").not_null()]))?
        .with_table(TableSchema::new(
            INSTALLS_INSTALL_MODULE,
            vec![
                reference("install_module", INSTALL_MODULE).not_null(),
                reference("install", INSTALL),
            ],
        ))?
        .with_foreign_key(ForeignKey::new(PHONE_NUMBER, "organization", ORGANIZATION))?
        .with_foreign_key(ForeignKey::new(PHONE_NUMBER, "person", PERSON))?
        .with_foreign_key(ForeignKey::new(ADDRESS, "organization", ORGANIZATION))?
        .with_foreign_key(ForeignKey::new(ADDRESS, "person", PERSON))?
        .with_foreign_key(ForeignKey::new(EMAIL_ADDRESS, "organization", ORGANIZATION))?
        .with_foreign_key(ForeignKey::new(EMAIL_ADDRESS, "person", PERSON))?
        .with_foreign_key(ForeignKey::new(INSTALL_KEY_CONTACT, "install", INSTALL))?
        .with_foreign_key(ForeignKey::new(INSTALL_SERVER, "install", INSTALL))?
        .with_foreign_key(ForeignKey::new(INSTALL_EQUIPMENT, "install", INSTALL))?
        .with_foreign_key(ForeignKey::new(INSTALL_INTERFACE, "install", INSTALL))?
        .with_foreign_key(ForeignKey::new(
            INSTALL_INTERFACES_CONTACT,
            "install_interface",
            INSTALL_INTERFACE,
        ))?
        .with_foreign_key(ForeignKey::new(INSTALL_CONTACT, "install", INSTALL))?
        .with_foreign_key(ForeignKey::new(INSTALLS_INSTALL_MODULE, "install", INSTALL))
}
