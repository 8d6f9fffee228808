//! End-to-end loader tests against a realistic package document

use packaudit_core::AuditConfig;
use packaudit_model::{parse, ComponentKind, PipelineRole};
use pretty_assertions::assert_eq;

const PACKAGE_XML: &str = r#"<?xml version="1.0"?>
<DTS:Executable xmlns:DTS="www.microsoft.com/SqlServer/Dts"
                xmlns:SQLTask="www.microsoft.com/sqlserver/dts/tasks/sqltask"
                DTS:ObjectName="Fill_DimCustomer"
                DTS:ExecutableType="Microsoft.Package"
                DTS:VersionMajor="8">
  <DTS:ConnectionManagers>
    <DTS:ConnectionManager DTS:ObjectName="CM_OLTP" DTS:CreationName="OLEDB">
      <DTS:ObjectData>
        <DTS:ConnectionManager DTS:ConnectionString="Data Source=sql01;Initial Catalog=OrdersDB;Provider=SQLNCLI11;"/>
      </DTS:ObjectData>
    </DTS:ConnectionManager>
    <DTS:ConnectionManager DTS:ObjectName="CM_Stage" DTS:CreationName="OLEDB">
      <DTS:ObjectData>
        <DTS:ConnectionManager DTS:ConnectionString="Data Source=sql02;Initial Catalog=DW_Stage;"/>
      </DTS:ObjectData>
    </DTS:ConnectionManager>
    <DTS:ConnectionManager DTS:ObjectName="CM_DW" DTS:CreationName="OLEDB">
      <DTS:ObjectData>
        <DTS:ConnectionManager DTS:ConnectionString="Data Source=sql02;Initial Catalog=DataWarehouse;"/>
      </DTS:ObjectData>
    </DTS:ConnectionManager>
  </DTS:ConnectionManagers>
  <DTS:Variables>
    <DTS:Variable DTS:ObjectName="V_BatchID" DTS:DataType="3">
      <DTS:VariableValue>0</DTS:VariableValue>
    </DTS:Variable>
    <DTS:Variable DTS:ObjectName="V_IncrementalLoadQuery" DTS:DataType="8">
      <DTS:VariableValue>SELECT 1</DTS:VariableValue>
    </DTS:Variable>
  </DTS:Variables>
  <DTS:Executables>
    <DTS:Executable DTS:ObjectName="Get Record from Config Table" DTS:ExecutableType="STOCK:SEQUENCE">
      <DTS:Executables>
        <DTS:Executable DTS:ObjectName="DFT Read Config" DTS:ExecutableType="Microsoft.Pipeline">
          <DTS:ObjectData>
            <pipeline>
              <components>
                <component refId="Package\DFT Read Config\Get Last Value" name="Get Last Value" componentClassID="Microsoft.OLEDBSource">
                  <properties>
                    <property name="SqlCommand">SELECT LastValue FROM dbo.ConfigTable WHERE TableName = 'DimCustomer'</property>
                  </properties>
                  <connections>
                    <connection connectionManagerRefId="Package.ConnectionManagers[CM_DW]"/>
                  </connections>
                  <outputs>
                    <output name="OLE DB Source Output"/>
                  </outputs>
                </component>
              </components>
            </pipeline>
          </DTS:ObjectData>
        </DTS:Executable>
      </DTS:Executables>
    </DTS:Executable>
    <DTS:Executable DTS:ObjectName="Extract and Transform Data from OLTP" DTS:ExecutableType="STOCK:SEQUENCE">
      <DTS:Executables>
        <DTS:Executable DTS:ObjectName="DFT Load Stage" DTS:ExecutableType="Microsoft.Pipeline">
          <DTS:ObjectData>
            <pipeline>
              <components>
                <component refId="Package\DFT Load Stage\Get Data From Customer" name="Get Data From Customer" componentClassID="Microsoft.OLEDBSource">
                  <properties>
                    <property name="SqlCommand">SELECT CustomerID, Name FROM dbo.Customer</property>
                    <property name="AlwaysUseDefaultCodePage">false</property>
                  </properties>
                  <connections>
                    <connection connectionManagerRefId="Package.ConnectionManagers[CM_OLTP]"/>
                  </connections>
                  <outputs>
                    <output name="OLE DB Source Output">
                      <outputColumns>
                        <outputColumn name="CustomerID" dataType="i4"/>
                        <outputColumn name="Name" dataType="wstr"/>
                      </outputColumns>
                    </output>
                  </outputs>
                </component>
                <component refId="Package\DFT Load Stage\Multiple Hash" name="Multiple Hash" componentClassID="Microsoft.ManagedComponentHost">
                  <properties>
                    <property name="HashType">6</property>
                  </properties>
                  <inputs>
                    <input name="Hash Input">
                      <inputColumns>
                        <inputColumn cachedName="CustomerID"/>
                        <inputColumn cachedName="Name"/>
                      </inputColumns>
                    </input>
                  </inputs>
                  <outputs>
                    <output name="Hash Output"/>
                  </outputs>
                </component>
                <component refId="Package\DFT Load Stage\Insert Into CustomerStage" name="Insert Into CustomerStage" componentClassID="Microsoft.OLEDBDestination">
                  <properties>
                    <property name="OpenRowset">[dbo].[CustomerStage]</property>
                    <property name="FastLoadOptions">TABLOCK,FIRE_TRIGGERS</property>
                  </properties>
                  <connections>
                    <connection connectionManagerRefId="Package.ConnectionManagers[CM_Stage]"/>
                  </connections>
                  <inputs>
                    <input name="OLE DB Destination Input">
                      <inputColumns>
                        <inputColumn cachedName="CustomerID"/>
                        <inputColumn cachedName="Name"/>
                      </inputColumns>
                      <externalMetadataColumns>
                        <externalMetadataColumn name="CustomerID"/>
                        <externalMetadataColumn name="Name"/>
                      </externalMetadataColumns>
                    </input>
                  </inputs>
                </component>
              </components>
              <paths>
                <path startId="Package\DFT Load Stage\Get Data From Customer.Outputs[OLE DB Source Output]"
                      endId="Package\DFT Load Stage\Multiple Hash.Inputs[Hash Input]"/>
                <path startId="Package\DFT Load Stage\Multiple Hash.Outputs[Hash Output]"
                      endId="Package\DFT Load Stage\Insert Into CustomerStage.Inputs[OLE DB Destination Input]"/>
              </paths>
            </pipeline>
          </DTS:ObjectData>
        </DTS:Executable>
        <DTS:Executable DTS:ObjectName="Create Clustered Index on CustomerStage" DTS:ExecutableType="Microsoft.ExecuteSQLTask">
          <DTS:ObjectData>
            <SQLTask:SqlTaskData SQLTask:SqlStatementSource="CREATE CLUSTERED INDEX CIX_CustomerStage ON dbo.CustomerStage (CustomerID)"/>
          </DTS:ObjectData>
        </DTS:Executable>
      </DTS:Executables>
    </DTS:Executable>
  </DTS:Executables>
</DTS:Executable>"#;

#[test]
fn full_package_model() {
    let doc = parse(PACKAGE_XML, &AuditConfig::default()).unwrap();

    assert_eq!(doc.name, "Fill_DimCustomer");
    assert_eq!(doc.variables.len(), 2);
    assert_eq!(doc.variables[0].name, "V_BatchID");
    assert_eq!(doc.variables[0].value, "0");

    assert_eq!(doc.connections.len(), 3);
    let stage = doc.connection("CM_Stage").unwrap();
    assert_eq!(stage.server.as_deref(), Some("sql02"));
    assert_eq!(stage.database.as_deref(), Some("DW_Stage"));

    assert_eq!(
        doc.containers,
        vec![
            "Get Record from Config Table".to_string(),
            "Extract and Transform Data from OLTP".to_string(),
        ]
    );
}

#[test]
fn pipelines_are_flattened_with_container_backrefs() {
    let doc = parse(PACKAGE_XML, &AuditConfig::default()).unwrap();

    assert_eq!(doc.pipelines.len(), 2);
    assert_eq!(doc.pipelines[0].name, "DFT Read Config");
    assert_eq!(
        doc.pipelines[0].container.as_deref(),
        Some("Get Record from Config Table")
    );
    assert_eq!(
        doc.pipelines[1].container.as_deref(),
        Some("Extract and Transform Data from OLTP")
    );

    // Roles are not assigned at load time
    assert!(doc
        .pipelines
        .iter()
        .all(|p| p.role == PipelineRole::Unclassified));
}

#[test]
fn components_carry_raw_properties_and_kinds() {
    let doc = parse(PACKAGE_XML, &AuditConfig::default()).unwrap();
    let stage_load = &doc.pipelines[1];

    assert_eq!(stage_load.components.len(), 3);

    let source = &stage_load.components[0];
    assert_eq!(source.kind, ComponentKind::Source);
    assert_eq!(source.type_tag, "oledbsource");
    assert_eq!(source.property("AlwaysUseDefaultCodePage"), Some("false"));
    assert_eq!(source.connection.as_deref(), Some("CM_OLTP"));
    assert!(source.command_text.as_deref().unwrap().contains("Customer"));

    let hash = &stage_load.components[1];
    assert_eq!(hash.kind, ComponentKind::Transform);
    assert_eq!(hash.type_tag, "multiplehash");

    let destination = &stage_load.components[2];
    assert_eq!(destination.kind, ComponentKind::Destination);
    assert_eq!(destination.connection.as_deref(), Some("CM_Stage"));
    assert_eq!(destination.property("OpenRowset"), Some("[dbo].[CustomerStage]"));
}

#[test]
fn components_capture_their_column_lists() {
    let doc = parse(PACKAGE_XML, &AuditConfig::default()).unwrap();
    let stage_load = &doc.pipelines[1];

    let source = &stage_load.components[0];
    assert_eq!(source.output_columns, vec!["CustomerID", "Name"]);
    assert!(source.input_columns.is_empty());

    let hash = &stage_load.components[1];
    assert_eq!(hash.input_columns, vec!["CustomerID", "Name"]);

    let destination = &stage_load.components[2];
    assert_eq!(destination.input_columns, vec!["CustomerID", "Name"]);
    assert_eq!(destination.external_columns, vec!["CustomerID", "Name"]);
}

#[test]
fn paths_resolve_to_component_edges() {
    let doc = parse(PACKAGE_XML, &AuditConfig::default()).unwrap();
    let stage_load = &doc.pipelines[1];

    assert_eq!(stage_load.edges, vec![(0, 1), (1, 2)]);
}

#[test]
fn sql_tasks_keep_their_statements_and_containers() {
    let doc = parse(PACKAGE_XML, &AuditConfig::default()).unwrap();

    assert_eq!(doc.tasks.len(), 1);
    let task = &doc.tasks[0];
    assert_eq!(task.name, "Create Clustered Index on CustomerStage");
    assert_eq!(
        task.container.as_deref(),
        Some("Extract and Transform Data from OLTP")
    );
    assert!(task
        .sql_statement
        .as_deref()
        .unwrap()
        .starts_with("CREATE CLUSTERED INDEX"));
}

#[test]
fn load_reads_the_document_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Fill_DimCustomer.dtsx");
    std::fs::write(&path, PACKAGE_XML).unwrap();

    let doc = packaudit_model::load(&path, &AuditConfig::default()).unwrap();
    assert_eq!(doc.name, "Fill_DimCustomer");
    assert_eq!(doc.pipelines.len(), 2);
}
